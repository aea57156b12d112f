use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::Pg;
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use utoipa::ToSchema;

/// Market data provider identifier
///
/// Stored on jobs, raw responses and price points as TEXT. A job names its
/// provider by this value; the live capability is looked up in the
/// `ProviderRegistry` at execution time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub enum ProviderKind {
    #[default]
    #[serde(rename = "yfinance")]
    YFinance,
}

impl ProviderKind {
    /// Convert enum to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::YFinance => "yfinance",
        }
    }

    /// Parse string to ProviderKind enum
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yfinance" => Some(ProviderKind::YFinance),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// Diesel ToSql implementation - convert Rust enum to SQL TEXT
impl ToSql<Text, Pg> for ProviderKind {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(serialize::IsNull::No)
    }
}

// Diesel FromSql implementation - convert SQL TEXT to Rust enum
impl FromSql<Text, Pg> for ProviderKind {
    fn from_sql(bytes: <Pg as diesel::backend::Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let text = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
        ProviderKind::from_str(&text)
            .ok_or_else(|| format!("Invalid provider value: {}", text).into())
    }
}
