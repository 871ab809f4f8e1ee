//! Minimal SQL execution seam used by migrations and scenarios.

use async_trait::async_trait;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};

use crate::error::BoxError;

/// Something that can run SQL: a client, or a fake in tests.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Run one or more statements with no parameters.
    async fn batch_execute(&self, sql: &str) -> Result<(), BoxError>;

    /// Run a single parameterized statement, returning rows affected.
    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<u64, BoxError>;
}

#[async_trait]
impl SqlExecutor for Client {
    async fn batch_execute(&self, sql: &str) -> Result<(), BoxError> {
        Client::batch_execute(self, sql).await.map_err(Into::into)
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<u64, BoxError> {
        Client::execute(self, sql, params).await.map_err(Into::into)
    }
}

/// Open a client for `conn_str`, driving the connection on a background task.
pub async fn connect(conn_str: &str) -> Result<Client, tokio_postgres::Error> {
    let (client, connection) = tokio_postgres::connect(conn_str, NoTls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Postgres connection error: {}", e);
        }
    });
    Ok(client)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// A statement seen by [`RecordingExecutor`], with parameters rendered
    /// through `Debug`.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) struct Statement {
        pub sql: String,
        pub params: Vec<String>,
    }

    /// Records statements; optionally fails the n-th one (0-based).
    #[derive(Default)]
    pub(crate) struct RecordingExecutor {
        pub statements: Mutex<Vec<Statement>>,
        pub fail_at: Option<usize>,
    }

    impl RecordingExecutor {
        pub(crate) fn failing_at(n: usize) -> Self {
            Self {
                fail_at: Some(n),
                ..Default::default()
            }
        }

        pub(crate) fn statements(&self) -> Vec<Statement> {
            self.statements.lock().unwrap().clone()
        }

        fn record(&self, sql: &str, params: Vec<String>) -> Result<(), BoxError> {
            let mut statements = self.statements.lock().unwrap();
            if self.fail_at == Some(statements.len()) {
                return Err("syntax error at or near \"oops\"".into());
            }
            statements.push(Statement {
                sql: sql.to_string(),
                params,
            });
            Ok(())
        }
    }

    #[async_trait]
    impl SqlExecutor for RecordingExecutor {
        async fn batch_execute(&self, sql: &str) -> Result<(), BoxError> {
            self.record(sql, Vec::new())
        }

        async fn execute(
            &self,
            sql: &str,
            params: &[&(dyn ToSql + Sync)],
        ) -> Result<u64, BoxError> {
            let params = params.iter().map(|p| format!("{:?}", p)).collect();
            self.record(sql, params).map(|_| 1)
        }
    }
}
