//! Template-driven facts rendering.
//!
//! Templates use [upon]'s Mustache-like syntax and see a single `facts`
//! variable: a list of `{ key, value }` maps. The well-known facts come first
//! (`version`, `stars`, `forks`), everything else follows in key order, so the
//! same facts always render the same way.
//!
//! Two addons are registered on every engine:
//!
//! - **`compact`** (function): shortens counts the way a source link shows
//!   them: `1204` becomes `1.2k`, `1960` becomes `2k`. Non-numeric values pass
//!   through untouched.
//! - **`escape`** (formatter): HTML-escapes the value. Facts come from a
//!   remote provider, so always end with it.

use crate::RenderFacts;
use crate::error::{Error, ErrorKind, Result};
use derive_more::Display;
use exn::ResultExt;
use srcfacts_facts::Facts;
use std::str::FromStr;
use tracing::instrument;
use upon::{Engine, Template};

/// Markup matching the source component of the documentation theme.
pub const DEFAULT_TEMPLATE: &str = concat!(
    r#"<ul class="md-source__facts">"#,
    "{% for fact in facts %}",
    r#"<li class="md-source__fact md-source__fact--{{ fact.key|escape }}">{{ fact.value|compact|escape }}</li>"#,
    "{% endfor %}",
    "</ul>",
);

/// Facts shown first, in this order.
const WELL_KNOWN: [&str; 3] = ["version", "stars", "forks"];

/// Rendered facts markup, ready to be written into an element.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
#[display("{_0}")]
pub struct Rendered(String);
impl Rendered {
    pub fn new(markup: impl Into<String>) -> Self {
        Self(markup.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Renders [`Facts`] through a compiled template.
///
/// Constructed via [`FromStr`], which compiles the template eagerly so that
/// syntax errors surface at creation time rather than at render time.
///
/// ```
/// use srcfacts_facts::Facts;
/// use srcfacts_render::{FactsRenderer, RenderFacts};
///
/// let renderer: FactsRenderer = "{% for fact in facts %}[{{ fact.key }}={{ fact.value|compact }}]{% endfor %}"
///     .parse()
///     .unwrap();
/// let facts = Facts::from([("forks", "96"), ("stars", "1204"), ("version", "v1.2.3")]);
/// assert_eq!(renderer.render(&facts).unwrap().as_str(), "[version=v1.2.3][stars=1.2k][forks=96]");
/// ```
pub struct FactsRenderer {
    engine: Engine<'static>,
    template: Template<'static>,
}
impl FromStr for FactsRenderer {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut engine = Engine::new();
        addons::configure(&mut engine);
        let template = engine.compile(s.to_string()).or_raise(|| ErrorKind::Template)?;
        Ok(Self { engine, template })
    }
}
impl FactsRenderer {
    /// A renderer using [`DEFAULT_TEMPLATE`].
    pub fn standard() -> Result<Self> {
        DEFAULT_TEMPLATE.parse()
    }

    /// Builds the [`upon::Value`] exposed to the template engine.
    fn parameters(facts: &Facts) -> upon::Value {
        let mut ordered: Vec<(&str, &str)> = facts.iter().collect();
        ordered.sort_by_key(|(key, _)| {
            let rank = WELL_KNOWN.iter().position(|known| known == key).unwrap_or(WELL_KNOWN.len());
            (rank, *key)
        });
        let items = ordered.into_iter().map(|(key, value)| upon::value! { key: key, value: value }).collect();
        upon::value! {
            facts: upon::Value::List(items),
        }
    }
}
impl RenderFacts for FactsRenderer {
    #[instrument(skip_all, fields(facts = facts.len()))]
    fn render(&self, facts: &Facts) -> Result<Rendered> {
        let markup = self
            .template
            .render(&self.engine, Self::parameters(facts))
            .to_string()
            .or_raise(|| ErrorKind::Template)?;
        Ok(Rendered::new(markup))
    }
}

mod addons {
    use std::fmt::Write;
    use upon::{Engine, Value, fmt as upon_fmt};

    /// Shortens a count to at most one decimal place in thousands.
    pub(super) fn compact(value: &str) -> String {
        let Ok(count) = value.trim().parse::<u64>() else {
            return value.to_string();
        };
        if count <= 999 {
            return count.to_string();
        }
        // Only show the decimal when it isn't going to round to a whole number.
        let digits = usize::from((count - 950) % 1000 > 99);
        format!("{:.*}k", digits, (count as f64 + 0.000001) / 1000.0)
    }

    fn escape(f: &mut upon_fmt::Formatter<'_>, value: &Value) -> upon_fmt::Result {
        match value {
            Value::String(s) => {
                for c in s.chars() {
                    match c {
                        '&' => f.write_str("&amp;")?,
                        '<' => f.write_str("&lt;")?,
                        '>' => f.write_str("&gt;")?,
                        '"' => f.write_str("&quot;")?,
                        '\'' => f.write_str("&#39;")?,
                        c => f.write_char(c)?,
                    }
                }
            },
            v => upon_fmt::default(f, v)?,
        };
        Ok(())
    }

    pub(crate) fn configure(engine: &mut Engine<'_>) {
        engine.add_function("compact", compact);
        engine.add_formatter("escape", escape);
    }
}
