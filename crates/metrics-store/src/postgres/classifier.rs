// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Maps database failures to retry decisions. Pure functions, no I/O.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retriable,
    NonRetriable,
}

// Class 08: connection exception
pub const CONNECTION_EXCEPTION: &str = "08000";
pub const CONNECTION_DOES_NOT_EXIST: &str = "08003";
pub const CONNECTION_FAILURE: &str = "08006";
// Class 40: transaction rollback
pub const TRANSACTION_ROLLBACK: &str = "40000";
pub const SERIALIZATION_FAILURE: &str = "40001";
pub const DEADLOCK_DETECTED: &str = "40P01";
// Class 57: operator intervention
pub const CANNOT_CONNECT_NOW: &str = "57P03";

// Class 22: data exception
pub const DATA_EXCEPTION: &str = "22000";
pub const NULL_VALUE_NOT_ALLOWED: &str = "22004";
// Class 23: integrity constraint violation
pub const INTEGRITY_CONSTRAINT_VIOLATION: &str = "23000";
pub const RESTRICT_VIOLATION: &str = "23001";
pub const NOT_NULL_VIOLATION: &str = "23502";
pub const FOREIGN_KEY_VIOLATION: &str = "23503";
pub const UNIQUE_VIOLATION: &str = "23505";
pub const CHECK_VIOLATION: &str = "23514";
// Class 42: syntax error or access rule violation
pub const SYNTAX_ERROR_OR_ACCESS_RULE_VIOLATION: &str = "42000";
pub const SYNTAX_ERROR: &str = "42601";
pub const UNDEFINED_COLUMN: &str = "42703";
pub const UNDEFINED_TABLE: &str = "42P01";
pub const UNDEFINED_FUNCTION: &str = "42883";

const RETRIABLE_CODES: &[&str] = &[
    CONNECTION_EXCEPTION,
    CONNECTION_DOES_NOT_EXIST,
    CONNECTION_FAILURE,
    TRANSACTION_ROLLBACK,
    SERIALIZATION_FAILURE,
    DEADLOCK_DETECTED,
    CANNOT_CONNECT_NOW,
];

/// Classifies a SQLSTATE code. Unknown codes are not retried.
pub fn classify_code(code: Option<&str>) -> ErrorClass {
    match code {
        Some(code) if RETRIABLE_CODES.contains(&code) => ErrorClass::Retriable,
        _ => ErrorClass::NonRetriable,
    }
}

/// Classifies a statement failure. `None` means there was no error.
pub fn classify(err: Option<&sqlx::Error>) -> ErrorClass {
    match err {
        Some(sqlx::Error::Database(db)) => classify_code(db.code().as_deref()),
        Some(sqlx::Error::Io(_)) | Some(sqlx::Error::PoolTimedOut) => ErrorClass::Retriable,
        _ => ErrorClass::NonRetriable,
    }
}

pub fn is_retriable(err: &sqlx::Error) -> bool {
    classify(Some(err)) == ErrorClass::Retriable
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_exception_is_retriable() {
        assert_eq!(classify_code(Some(CONNECTION_EXCEPTION)), ErrorClass::Retriable);
        assert_eq!(classify_code(Some(CONNECTION_FAILURE)), ErrorClass::Retriable);
        assert_eq!(classify_code(Some(SERIALIZATION_FAILURE)), ErrorClass::Retriable);
        assert_eq!(classify_code(Some(DEADLOCK_DETECTED)), ErrorClass::Retriable);
        assert_eq!(classify_code(Some(CANNOT_CONNECT_NOW)), ErrorClass::Retriable);
    }

    #[test]
    fn test_constraint_and_schema_errors_are_not_retriable() {
        for code in [
            UNIQUE_VIOLATION,
            NOT_NULL_VIOLATION,
            CHECK_VIOLATION,
            DATA_EXCEPTION,
            SYNTAX_ERROR,
            UNDEFINED_TABLE,
            UNDEFINED_COLUMN,
            "XX000",
        ] {
            assert_eq!(classify_code(Some(code)), ErrorClass::NonRetriable, "{code}");
        }
    }

    #[test]
    fn test_no_error_is_not_retriable() {
        assert_eq!(classify(None), ErrorClass::NonRetriable);
        assert_eq!(classify_code(None), ErrorClass::NonRetriable);
    }

    #[test]
    fn test_transport_failures_are_retriable() {
        let io = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(is_retriable(&io));
        assert!(is_retriable(&sqlx::Error::PoolTimedOut));
        assert!(!is_retriable(&sqlx::Error::RowNotFound));
    }
}
