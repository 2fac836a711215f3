//! PostgreSQL type OIDs and textual query parameters.
//!
//! Parameters travel to the server in text format, each tagged with the OID
//! of the type the server should assign to the placeholder. To find the OID
//! of a value, run `SELECT pg_typeof(...)::oid` against a server.

use serde::Serialize;

use super::error::{PgError, PgResult};

// ============================================================================
// Type OIDs
// ============================================================================

/// PostgreSQL type object identifiers (OIDs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Oid(pub i32);

impl Oid {
    pub const BOOL: Oid = Oid(16);
    pub const INT8: Oid = Oid(20);
    pub const INT2: Oid = Oid(21);
    pub const INT4: Oid = Oid(23);
    pub const TEXT: Oid = Oid(25);
    pub const JSON: Oid = Oid(114);
    pub const FLOAT4: Oid = Oid(700);
    pub const FLOAT8: Oid = Oid(701);
    pub const VARCHAR: Oid = Oid(1043);

    /// Create from a raw i32 value.
    #[inline]
    pub fn from_i32(oid: i32) -> Self {
        Oid(oid)
    }

    /// Get the raw i32 value.
    #[inline]
    pub fn as_i32(self) -> i32 {
        self.0
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// One query parameter: a type OID plus the value's textual form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub oid: Oid,
    pub value: String,
}

impl Param {
    /// 32-bit integer parameter.
    pub fn int4(value: i32) -> Self {
        Param {
            oid: Oid::INT4,
            value: value.to_string(),
        }
    }

    /// 64-bit integer parameter.
    pub fn int8(value: i64) -> Self {
        Param {
            oid: Oid::INT8,
            value: value.to_string(),
        }
    }

    /// Double-precision float parameter.
    pub fn float8(value: f64) -> Self {
        Param {
            oid: Oid::FLOAT8,
            value: value.to_string(),
        }
    }

    /// Boolean parameter, sent as `"1"` or `"0"`.
    pub fn bool_(value: bool) -> Self {
        Param {
            oid: Oid::BOOL,
            value: if value { "1" } else { "0" }.to_string(),
        }
    }

    /// Text parameter.
    pub fn varchar(value: impl Into<String>) -> Self {
        Param {
            oid: Oid::VARCHAR,
            value: value.into(),
        }
    }

    /// JSON parameter from a pre-encoded JSON string.
    pub fn json(value: impl Into<String>) -> Self {
        Param {
            oid: Oid::JSON,
            value: value.into(),
        }
    }

    /// JSON-array parameter serialized from a slice of values.
    pub fn json_array<T: Serialize>(values: &[T]) -> PgResult<Self> {
        let encoded = serde_json::to_string(values)
            .map_err(|e| PgError::Config(format!("JSON parameter encoding failed: {}", e)))?;
        Ok(Param {
            oid: Oid::JSON,
            value: encoded,
        })
    }
}

impl From<i32> for Param {
    fn from(v: i32) -> Self {
        Param::int4(v)
    }
}

impl From<u32> for Param {
    fn from(v: u32) -> Self {
        Param {
            oid: Oid::INT4,
            value: v.to_string(),
        }
    }
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Param::int8(v)
    }
}

impl From<u64> for Param {
    fn from(v: u64) -> Self {
        Param {
            oid: Oid::INT8,
            value: v.to_string(),
        }
    }
}

impl From<f64> for Param {
    fn from(v: f64) -> Self {
        Param::float8(v)
    }
}

impl From<bool> for Param {
    fn from(v: bool) -> Self {
        Param::bool_(v)
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Param::varchar(v)
    }
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Param::varchar(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_params() {
        assert_eq!(Param::from(7i32), Param::int4(7));
        assert_eq!(Param::int4(-12).value, "-12");
        assert_eq!(Param::int4(-12).oid, Oid::INT4);

        let p = Param::from(u32::MAX);
        assert_eq!(p.oid, Oid::INT4);
        assert_eq!(p.value, "4294967295");

        assert_eq!(Param::int8(1 << 40).oid, Oid::INT8);
        assert_eq!(Param::from(u64::MAX).value, "18446744073709551615");
    }

    #[test]
    fn test_bool_param_text_form() {
        assert_eq!(Param::bool_(true).value, "1");
        assert_eq!(Param::bool_(false).value, "0");
        assert_eq!(Param::from(true).oid, Oid::BOOL);
    }

    #[test]
    fn test_float_param() {
        let p = Param::float8(1.5);
        assert_eq!(p.oid, Oid::FLOAT8);
        assert_eq!(p.value, "1.5");
    }

    #[test]
    fn test_varchar_param() {
        let p = Param::from("hello");
        assert_eq!(p.oid, Oid::VARCHAR);
        assert_eq!(p.value, "hello");
    }

    #[test]
    fn test_json_array_param() {
        let p = Param::json_array(&[1, 2, 3]).unwrap();
        assert_eq!(p.oid, Oid::JSON);
        assert_eq!(p.value, "[1,2,3]");

        let p = Param::json_array(&["a", "b"]).unwrap();
        assert_eq!(p.value, r#"["a","b"]"#);
    }
}
