//! SQLSTATE → error-class mapping

use queryloom_core::{ErrorClass, ExecutionError};

/// Classify a PostgreSQL SQLSTATE code.
///
/// - `42P01` undefined_table, `42703` undefined_column → schema mismatch
/// - `42804` datatype_mismatch, `22P02` invalid_text_representation,
///   `42883` undefined_function (operator applied to wrong types) → type mismatch
/// - `57014` query_canceled → timeout
/// - `42501` insufficient_privilege → permission denied
pub fn classify_sqlstate(code: &str) -> ErrorClass {
    match code {
        "42P01" | "42703" => ErrorClass::SchemaMismatch,
        "42804" | "22P02" | "42883" => ErrorClass::TypeMismatch,
        "57014" => ErrorClass::Timeout,
        "42501" => ErrorClass::PermissionDenied,
        _ => ErrorClass::Other,
    }
}

pub(crate) fn classify_sqlx_error(err: sqlx::Error) -> ExecutionError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let class = db_err
                .code()
                .map_or(ErrorClass::Other, |code| classify_sqlstate(code.as_ref()));
            ExecutionError::new(class, db_err.message().to_owned())
        },
        sqlx::Error::PoolTimedOut => ExecutionError::new(ErrorClass::Timeout, err.to_string()),
        _ => ExecutionError::new(ErrorClass::Other, err.to_string()),
    }
}
