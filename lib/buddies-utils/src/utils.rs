pub fn log_internal_error(error: impl std::fmt::Display) {
    tracing::error!("SERVER ERROR: {:#}", error);
}
