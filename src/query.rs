//! Queries and the request/response values that flow through the engine.

use smallvec::SmallVec;

use crate::pg::types::Param;
use crate::results::ResultSet;

/// Completion callback: invoked exactly once with ownership of the result.
pub type Callback = Box<dyn FnOnce(ResultSet) + Send + 'static>;

/// A SQL command plus its positional parameters.
///
/// ```
/// use pgpipe::{Param, Query};
///
/// let q = Query::new("select email from user_account where user_account_id=$1 and active=$2")
///     .bind(Param::varchar("f8fe3c30-c3ee-43e3-b0f9-6829553aba64"))
///     .bind(true);
/// assert_eq!(q.params().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct Query {
    sql: String,
    params: SmallVec<[Param; 4]>,
}

impl Query {
    /// A query with no parameters (bind some with [`Query::bind`]).
    pub fn new(sql: impl Into<String>) -> Self {
        Query {
            sql: sql.into(),
            params: SmallVec::new(),
        }
    }

    /// Append one positional parameter ($1, $2, … in bind order).
    pub fn bind(mut self, param: impl Into<Param>) -> Self {
        self.params.push(param.into());
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }
}

impl From<&str> for Query {
    fn from(sql: &str) -> Self {
        Query::new(sql)
    }
}

impl From<String> for Query {
    fn from(sql: String) -> Self {
        Query::new(sql)
    }
}

/// A query travelling from a producer to the I/O thread.
///
/// Move-only: the request is created by the producer, moved through the
/// request queue, and consumed when a connection takes ownership of its
/// callback slot.
pub struct QueryRequest {
    pub(crate) query: Query,
    pub(crate) callback: Option<Callback>,
}

impl QueryRequest {
    pub(crate) fn new(query: Query, callback: Option<Callback>) -> Self {
        QueryRequest { query, callback }
    }
}

/// A finished result travelling from the I/O thread to the dispatcher.
pub struct QueryResponse {
    pub(crate) result_set: ResultSet,
    pub(crate) callback: Option<Callback>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pg::types::Oid;

    #[test]
    fn test_builder_binds_in_order() {
        let q = Query::new("select 1 from tbl where a=$1 and b=$2 and c=$3")
            .bind(7i32)
            .bind("x")
            .bind(2.5f64);

        let oids: Vec<Oid> = q.params().iter().map(|p| p.oid).collect();
        assert_eq!(oids, vec![Oid::INT4, Oid::VARCHAR, Oid::FLOAT8]);
        assert_eq!(q.params()[0].value, "7");
    }

    #[test]
    fn test_from_str_is_parameterless() {
        let q: Query = "select now()".into();
        assert!(q.params().is_empty());
        assert_eq!(q.sql(), "select now()");
    }
}
