/// Row-matching predicate over a single column of a single table: either an
/// exact match or an IN-list. This is the whole query surface the core needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub table: String,
    pub column: String,
    pub matcher: Matcher,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    Equals(String),
    AnyOf(Vec<String>),
}

impl Predicate {
    pub fn equals(
        table: impl Into<String>,
        column: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Predicate {
            table: table.into(),
            column: column.into(),
            matcher: Matcher::Equals(value.into()),
        }
    }

    pub fn any_of(
        table: impl Into<String>,
        column: impl Into<String>,
        values: Vec<String>,
    ) -> Self {
        Predicate {
            table: table.into(),
            column: column.into(),
            matcher: Matcher::AnyOf(values),
        }
    }

    /// True for `value` under exact, case-sensitive comparison. Backends that
    /// evaluate predicates in-process use this.
    pub fn matches(&self, value: &str) -> bool {
        match &self.matcher {
            Matcher::Equals(v) => v == value,
            Matcher::AnyOf(vs) => vs.iter().any(|v| v == value),
        }
    }

    /// Render the criteria clause, with every value quoted and escaped.
    /// Used both by SQL-ish backends and to bound predicate size.
    pub fn render(&self) -> String {
        match &self.matcher {
            Matcher::Equals(v) => format!("[{}]={}", self.column, quote(v)),
            Matcher::AnyOf(vs) => {
                let quoted: Vec<String> = vs.iter().map(|v| quote(v)).collect();
                format!("[{}] IN ({})", self.column, quoted.join(","))
            }
        }
    }
}

/// Single-quote a literal, doubling embedded quotes.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
