//! 저장소 계층 오류 타입.

use thiserror::Error;

/// 저장소 작업 오류.
#[derive(Debug, Error)]
pub enum StorageError {
    /// 데이터베이스 연결 오류
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// 쿼리 실행 오류
    #[error("Query error: {0}")]
    QueryError(String),

    /// 이미 존재하는 객체 (스키마/테이블/타입)
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// 고유 키 중복
    #[error("Duplicate record: {0}")]
    DuplicateError(String),

    /// 연결 풀 소진
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// 트랜잭션 오류
    #[error("Transaction error: {0}")]
    TransactionError(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => StorageError::PoolExhausted,
            sqlx::Error::Io(e) => StorageError::ConnectionError(e.to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().unwrap_or_default();
                match code.as_ref() {
                    // PostgreSQL 고유 제약 조건 위반
                    "23505" => StorageError::DuplicateError(db_err.message().to_string()),
                    // duplicate_table / duplicate_schema / duplicate_object
                    "42P07" | "42P06" | "42710" => {
                        StorageError::AlreadyExists(db_err.message().to_string())
                    }
                    _ => StorageError::QueryError(db_err.message().to_string()),
                }
            }
            _ => StorageError::QueryError(err.to_string()),
        }
    }
}

impl StorageError {
    /// 동시 생성 경합으로 인한 "이미 존재" 오류인지 확인합니다.
    ///
    /// `CREATE ... IF NOT EXISTS`도 동시에 실행되면 카탈로그 고유 제약
    /// (`23505`)으로 실패할 수 있습니다.
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            StorageError::AlreadyExists(_) | StorageError::DuplicateError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_exists_classification() {
        assert!(StorageError::AlreadyExists("fx_rates".into()).is_already_exists());
        assert!(StorageError::DuplicateError("pg_type".into()).is_already_exists());
        assert!(!StorageError::QueryError("syntax".into()).is_already_exists());
        assert!(!StorageError::PoolExhausted.is_already_exists());
    }

    #[test]
    fn test_pool_timeout_maps_to_exhausted() {
        let err: StorageError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, StorageError::PoolExhausted));
    }
}
