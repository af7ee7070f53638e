use thiserror::Error;

/// All errors generated in `tpo-data`.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum DataError {
    #[error("exchange returned an empty candle payload")]
    EmptyResponse,

    #[error("candle payload schema mismatch at row {row}: {message}")]
    Schema { row: usize, message: String },

    #[error("insufficient data: need {needed} bars, got {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("network timeout: {0}")]
    NetworkTimeout(String),

    #[error("network failure: {0}")]
    NetworkFailure(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("profile engine rejected input: {0}")]
    Profile(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl DataError {
    /// Determine if an error originated from the transport rather than the payload.
    #[allow(clippy::match_like_matches_macro)]
    pub fn is_network(&self) -> bool {
        match self {
            DataError::NetworkTimeout(_) | DataError::NetworkFailure(_) => true,
            _ => false,
        }
    }

    pub(crate) fn schema(row: usize, message: impl Into<String>) -> Self {
        Self::Schema {
            row,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for DataError {
    fn from(error: reqwest::Error) -> Self {
        let target = error
            .url()
            .map(|url| url.host_str().unwrap_or_default().to_string())
            .unwrap_or_default();

        if error.is_timeout() {
            Self::NetworkTimeout(format!("{target}: {error}"))
        } else {
            Self::NetworkFailure(format!("{target}: {error}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_error_is_network() {
        struct TestCase {
            input: DataError,
            expected: bool,
        }

        let tests = vec![
            TestCase {
                // TC0: timeout is a network error
                input: DataError::NetworkTimeout("api.binance.com: operation timed out".to_string()),
                expected: true,
            },
            TestCase {
                // TC1: failed request is a network error
                input: DataError::NetworkFailure("www.binance.com: HTTP 451".to_string()),
                expected: true,
            },
            TestCase {
                // TC2: empty payload is not a network error
                input: DataError::EmptyResponse,
                expected: false,
            },
            TestCase {
                // TC3: schema mismatch is not a network error
                input: DataError::schema(3, "expected at least 6 fields, got 4"),
                expected: false,
            },
            TestCase {
                // TC4: insufficient data is not a network error
                input: DataError::InsufficientData {
                    needed: 3,
                    available: 1,
                },
                expected: false,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = test.input.is_network();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_data_error_display() {
        let error = DataError::InsufficientData {
            needed: 3,
            available: 1,
        };
        assert_eq!(error.to_string(), "insufficient data: need 3 bars, got 1");

        let error = DataError::schema(7, "open is not numeric");
        assert_eq!(
            error.to_string(),
            "candle payload schema mismatch at row 7: open is not numeric"
        );
    }
}
