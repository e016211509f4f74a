// Tagged result for controller operations
//
// Every data operation resolves to `Result<Reply<T>, Error>`: the payload,
// a recoverable rejection carrying the controller's error text, or a fatal
// error. Callers never have to inspect status codes themselves.

use std::fmt;

use serde_json::Value;

use crate::error::Error;

/// Outcome of a request the controller actually answered.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply<T> {
    /// The request succeeded; `T` is the operation's payload.
    Success(T),
    /// The controller refused the request in a way the caller can act on.
    Rejected(Rejection),
}

impl<T> Reply<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The payload, if the request succeeded.
    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(v) => Some(v),
            Self::Rejected(_) => None,
        }
    }

    /// The rejection, if the controller refused the request.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Success(_) => None,
            Self::Rejected(r) => Some(r),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reply<U> {
        match self {
            Self::Success(v) => Reply::Success(f(v)),
            Self::Rejected(r) => Reply::Rejected(r),
        }
    }

    /// Collapse into a plain `Result`, promoting a rejection to
    /// [`Error::Rejected`].
    pub fn into_result(self) -> Result<T, Error> {
        match self {
            Self::Success(v) => Ok(v),
            Self::Rejected(r) => Err(Error::Rejected(r)),
        }
    }
}

/// A non-fatal refusal from the controller.
///
/// `text` is the controller's error text when the body followed the
/// `imdata[0].error.attributes.text` convention, otherwise the raw body.
/// Displays as `"<status>: <text>"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub status: u16,
    pub text: String,
    /// The decoded response body (`Value::Null` if it was not JSON).
    pub body: Value,
}

impl Rejection {
    pub fn is_bad_request(&self) -> bool {
        self.status == 400
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.text)
    }
}

impl std::error::Error for Rejection {}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn bad_request(text: &str) -> Rejection {
        Rejection {
            status: 400,
            text: text.into(),
            body: json!({"imdata": [{"error": {"attributes": {"text": text}}}]}),
        }
    }

    #[test]
    fn rejection_renders_status_prefix() {
        let r = bad_request("unknown class fvTenFailFailant");
        assert_eq!(r.to_string(), "400: unknown class fvTenFailFailant");
        assert!(r.is_bad_request());
    }

    #[test]
    fn into_result_promotes_rejection() {
        let reply: Reply<u16> = Reply::Rejected(bad_request("nope"));
        let err = reply.into_result().unwrap_err();
        assert!(matches!(err, Error::Rejected(ref r) if r.text == "nope"));
        assert!(!err.is_transport_failure());
    }

    #[test]
    fn map_keeps_rejection() {
        let reply: Reply<u16> = Reply::Success(200);
        assert_eq!(reply.map(|s| s == 200), Reply::Success(true));

        let reply: Reply<u16> = Reply::Rejected(bad_request("x"));
        assert!(reply.map(|s| s == 200).rejection().is_some());
    }
}
