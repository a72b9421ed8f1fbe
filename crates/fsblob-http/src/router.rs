//! Request routing: maps method, path, and query onto a [`Route`].
//!
//! Objects live under `/objects/<name>`. The sub-resource is chosen from the
//! query string the same way an S3-style API does it:
//!
//! | Method | Query | Route |
//! |--------|-------|-------|
//! | `PUT` | (none) / `uploadId` + `partNumber` | [`Route::Write`] |
//! | `GET` | (none) | [`Route::GetObject`] |
//! | `GET` | `uploadId` | [`Route::ListParts`] |
//! | `HEAD` | (none) | [`Route::HeadObject`] |
//! | `DELETE` | (none) | [`Route::DeleteObject`] |
//! | `DELETE` | `uploadId` | [`Route::AbortSession`] |
//! | `POST` | `uploads` | [`Route::CreateSession`] |
//! | `POST` | `uploadId` | [`Route::CompleteSession`] |

use fsblob_core::target::OBJECTS_PATH_PREFIX;
use http::Method;
use percent_encoding::percent_decode_str;

/// Path answered by the health check.
pub const HEALTH_PATH: &str = "/health";

/// A routing failure.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// No resource lives at this path.
    #[error("No resource at {path}")]
    NotFound {
        /// The request path.
        path: String,
    },

    /// The resource exists but does not support the method.
    #[error("Method {method} is not allowed against this resource")]
    MethodNotAllowed {
        /// The request method.
        method: String,
    },

    /// The object name does not decode to UTF-8.
    #[error("Invalid object name {raw}: {reason}")]
    InvalidName {
        /// The name as it appeared in the path.
        raw: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A query parameter is malformed.
    #[error("Invalid query parameter {name}: {reason}")]
    InvalidQuery {
        /// Parameter name.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// The operation a request maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Health check.
    Health,
    /// Receive bytes for an object, or for one part when both `upload_id` and
    /// `part_number` are present.
    Write {
        /// Object name as sent by the client, percent-decoded.
        name: String,
        /// Session token.
        upload_id: Option<String>,
        /// Part number.
        part_number: Option<u32>,
    },
    /// Stream an object.
    GetObject {
        /// Object name.
        name: String,
    },
    /// Describe an object.
    HeadObject {
        /// Object name.
        name: String,
    },
    /// Delete an object.
    DeleteObject {
        /// Object name.
        name: String,
    },
    /// Start a multipart session.
    CreateSession {
        /// Object name.
        name: String,
    },
    /// Complete a multipart session.
    CompleteSession {
        /// Object name.
        name: String,
        /// Session token.
        upload_id: String,
    },
    /// List uploaded parts.
    ListParts {
        /// Object name.
        name: String,
        /// Session token.
        upload_id: String,
    },
    /// Abort a multipart session.
    AbortSession {
        /// Object name.
        name: String,
        /// Session token.
        upload_id: String,
    },
}

impl Route {
    /// Short operation name for logs.
    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Health => "Health",
            Self::Write {
                upload_id: None,
                part_number: None,
                ..
            } => "PutObject",
            Self::Write { .. } => "UploadPart",
            Self::GetObject { .. } => "GetObject",
            Self::HeadObject { .. } => "HeadObject",
            Self::DeleteObject { .. } => "DeleteObject",
            Self::CreateSession { .. } => "CreateSession",
            Self::CompleteSession { .. } => "CompleteSession",
            Self::ListParts { .. } => "ListParts",
            Self::AbortSession { .. } => "AbortSession",
        }
    }

    /// The object name, if the route addresses one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Health => None,
            Self::Write { name, .. }
            | Self::GetObject { name }
            | Self::HeadObject { name }
            | Self::DeleteObject { name }
            | Self::CreateSession { name }
            | Self::CompleteSession { name, .. }
            | Self::ListParts { name, .. }
            | Self::AbortSession { name, .. } => Some(name),
        }
    }
}

/// Resolve a request to a [`Route`].
///
/// # Errors
///
/// Returns a [`RouteError`] if nothing lives at the path, the method is not
/// supported, the object name is not valid percent-encoded UTF-8, or
/// `partNumber` is not a number.
pub fn resolve<B>(req: &http::Request<B>) -> Result<Route, RouteError> {
    let method = req.method();
    let path = req.uri().path();

    if path == HEALTH_PATH {
        return if *method == Method::GET {
            Ok(Route::Health)
        } else {
            Err(RouteError::MethodNotAllowed {
                method: method.to_string(),
            })
        };
    }

    let Some(raw_name) = path
        .strip_prefix(OBJECTS_PATH_PREFIX)
        .and_then(|rest| rest.strip_prefix('/'))
    else {
        return Err(RouteError::NotFound {
            path: path.to_owned(),
        });
    };
    let name = percent_decode_str(raw_name)
        .decode_utf8()
        .map_err(|e| RouteError::InvalidName {
            raw: raw_name.to_owned(),
            reason: e.to_string(),
        })?
        .into_owned();
    let params = parse_query_params(req.uri().query().unwrap_or(""));
    let upload_id = query_value(&params, "uploadId").map(str::to_owned);

    match *method {
        Method::PUT => {
            let part_number = query_value(&params, "partNumber")
                .map(parse_part_number)
                .transpose()?;
            Ok(Route::Write {
                name,
                upload_id,
                part_number,
            })
        }
        Method::GET => Ok(match upload_id {
            Some(upload_id) => Route::ListParts { name, upload_id },
            None => Route::GetObject { name },
        }),
        Method::HEAD => Ok(Route::HeadObject { name }),
        Method::DELETE => Ok(match upload_id {
            Some(upload_id) => Route::AbortSession { name, upload_id },
            None => Route::DeleteObject { name },
        }),
        Method::POST => {
            if query_has_key(&params, "uploads") {
                Ok(Route::CreateSession { name })
            } else if let Some(upload_id) = upload_id {
                Ok(Route::CompleteSession { name, upload_id })
            } else {
                Err(RouteError::MethodNotAllowed {
                    method: method.to_string(),
                })
            }
        }
        _ => Err(RouteError::MethodNotAllowed {
            method: method.to_string(),
        }),
    }
}

fn parse_part_number(value: &str) -> Result<u32, RouteError> {
    value.parse::<u32>().map_err(|e| RouteError::InvalidQuery {
        name: "partNumber",
        reason: e.to_string(),
    })
}

/// Parse a query string into key-value pairs.
fn parse_query_params(query: &str) -> Vec<(String, String)> {
    form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn query_has_key(params: &[(String, String)], key: &str) -> bool {
    params.iter().any(|(k, _)| k == key)
}

fn query_value<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}
