/// Logs the error of a `Result` and discards it.
///
/// Meant for shutdown and other best-effort paths where a failure must be visible but
/// must not abort the caller.
pub trait ResultOkLogExt<T, E> {
    fn ok_log(self) -> Option<T>;

    /// Like [`ResultOkLogExt::ok_log`], prefixing the log line with `context`.
    fn ok_log_with(self, context: &str) -> Option<T>;
}

impl<T, E> ResultOkLogExt<T, E> for std::result::Result<T, E>
where
    E: std::error::Error,
{
    fn ok_log(self) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::error!("{err}");
                None
            }
        }
    }

    fn ok_log_with(self, context: &str) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                match err.source() {
                    Some(source) => log::error!("{context}: {err}: {source}"),
                    None => log::error!("{context}: {err}"),
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_log() {
        let ok: Result<u8, std::fmt::Error> = Ok(1);
        let err: Result<u8, std::fmt::Error> = Err(std::fmt::Error);

        assert_eq!(ok.ok_log(), Some(1));
        assert_eq!(err.ok_log(), None);
        assert_eq!(err.ok_log_with("formatting"), None);
    }
}
