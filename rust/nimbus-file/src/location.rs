//! Object locations.
//!
//! Supported forms:
//!
//! | URL | Meaning |
//! |-----|---------|
//! | `http://host[:port]/path[?query]`, `https://...` | plain object |
//! | `s3://host[:port]/bucket/key`, `s3https://...` | S3 over HTTPS |
//! | `s3http://host[:port]/bucket/key` | S3 over HTTP |
//! | `gs://host[:port]/bucket/key`, `gshttps://...` | Google Storage over HTTPS |
//! | `gshttp://host[:port]/bucket/key` | Google Storage over HTTP |
//! | `swift://container/key` | Swift object, server from the identity service |
//!
//! Scheme matching is case-insensitive.

use std::fmt;

use nimbus_auth::Flavor;
use url::Url;

use crate::FileError;

/// Where a remote file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// A plain HTTP(S) object
    Http {
        /// The object URL
        url: Url,
    },
    /// An object in an S3-compatible bucket
    S3 {
        /// `http(s)://host/bucket/key`
        url: Url,
        /// Signing dialect
        flavor: Flavor,
        /// Bucket name
        bucket: String,
        /// Object key
        key: String,
    },
    /// An object in a Swift container
    Swift {
        /// Container name
        container: String,
        /// Object name
        key: String,
    },
}

impl Location {
    /// Parses a location URL.
    pub fn parse(location: &str) -> Result<Self, FileError> {
        let (scheme, rest) = location
            .split_once("://")
            .ok_or_else(|| FileError::InvalidLocation(location.to_string()))?;

        match scheme.to_ascii_lowercase().as_str() {
            "http" | "https" => {
                let url = Url::parse(location)
                    .map_err(|error| FileError::InvalidLocation(format!("{location}: {error}")))?;
                if url.host_str().is_none_or(str::is_empty) {
                    return Err(FileError::InvalidLocation(location.to_string()));
                }
                Ok(Location::Http { url })
            }
            scheme @ ("s3" | "s3http" | "s3https" | "gs" | "gshttp" | "gshttps") => {
                let transport = if scheme.ends_with("http") { "http" } else { "https" };
                let flavor = if scheme.starts_with("gs") {
                    Flavor::Google
                } else {
                    Flavor::Amazon
                };
                let invalid = || {
                    FileError::InvalidLocation(format!(
                        "{location}: expected {scheme}://host/bucket/key"
                    ))
                };

                let (host, path) = rest.split_once('/').ok_or_else(invalid)?;
                let (bucket, key) = path.split_once('/').ok_or_else(invalid)?;
                if host.is_empty() || bucket.is_empty() || key.is_empty() || key.starts_with('/') {
                    return Err(invalid());
                }

                let url = Url::parse(&format!("{transport}://{host}/{bucket}/{key}"))
                    .map_err(|error| FileError::InvalidLocation(format!("{location}: {error}")))?;
                Ok(Location::S3 {
                    url,
                    flavor,
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
            }
            "swift" => {
                let invalid = || {
                    FileError::InvalidLocation(format!(
                        "{location}: expected swift://container/object"
                    ))
                };
                let (container, key) = rest.split_once('/').ok_or_else(invalid)?;
                if container.is_empty() || key.is_empty() || key.starts_with('/') {
                    return Err(invalid());
                }
                Ok(Location::Swift {
                    container: container.to_string(),
                    key: key.to_string(),
                })
            }
            other => Err(FileError::UnsupportedScheme(other.to_string())),
        }
    }

    /// The server URL a session should bind to, when known up front. Swift
    /// servers are only known after authentication.
    pub fn server_url(&self) -> Option<&Url> {
        match self {
            Location::Http { url } | Location::S3 { url, .. } => Some(url),
            Location::Swift { .. } => None,
        }
    }

    /// The request path of the object. For Swift this is relative to the
    /// storage URL.
    pub fn object_path(&self) -> String {
        match self {
            Location::Http { url } | Location::S3 { url, .. } => url.path().to_string(),
            Location::Swift { container, key } => format!("/{container}/{key}"),
        }
    }

    /// The query sent with every request.
    pub fn query(&self) -> &str {
        match self {
            Location::Http { url } => url.query().unwrap_or_default(),
            Location::S3 { .. } | Location::Swift { .. } => "",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Http { url } => write!(f, "{url}"),
            Location::S3 { url, flavor, .. } => {
                let prefix = match flavor {
                    Flavor::Amazon => "s3",
                    Flavor::Google => "gs",
                };
                write!(f, "{prefix}+{url}")
            }
            Location::Swift { container, key } => write!(f, "swift://{container}/{key}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use testresult::TestResult;

    #[test]
    fn it_parses_http_locations() -> TestResult {
        let location = Location::parse("https://data.example.com:8443/run/file.root?token=x")?;
        assert_eq!(
            location.server_url().map(Url::as_str),
            Some("https://data.example.com:8443/run/file.root?token=x")
        );
        assert_eq!(location.object_path(), "/run/file.root");
        assert_eq!(location.query(), "token=x");
        Ok(())
    }

    #[test]
    fn it_parses_s3_locations() -> TestResult {
        let location = Location::parse("s3://s3.amazonaws.com/bucket/dir/key.root")?;
        let Location::S3 {
            url,
            flavor,
            bucket,
            key,
        } = &location
        else {
            return Err("not an s3 location".into());
        };
        assert_eq!(url.as_str(), "https://s3.amazonaws.com/bucket/dir/key.root");
        assert_eq!(*flavor, Flavor::Amazon);
        assert_eq!(bucket, "bucket");
        assert_eq!(key, "dir/key.root");
        assert_eq!(location.object_path(), "/bucket/dir/key.root");
        assert_eq!(location.query(), "");
        Ok(())
    }

    #[test]
    fn it_selects_transport_and_flavor_from_scheme() -> TestResult {
        let cases = [
            ("s3http://h:9000/b/k", "http://h:9000/b/k", Flavor::Amazon),
            ("S3HTTPS://h/b/k", "https://h/b/k", Flavor::Amazon),
            ("gs://storage.googleapis.com/b/k", "https://storage.googleapis.com/b/k", Flavor::Google),
            ("gshttp://h/b/k", "http://h/b/k", Flavor::Google),
            ("gshttps://h/b/k", "https://h/b/k", Flavor::Google),
        ];
        for (input, expected_url, expected_flavor) in cases {
            match Location::parse(input)? {
                Location::S3 { url, flavor, .. } => {
                    assert_eq!(url.as_str(), expected_url);
                    assert_eq!(flavor, expected_flavor);
                }
                other => return Err(format!("{input} parsed as {other:?}").into()),
            }
        }
        Ok(())
    }

    #[test]
    fn it_rejects_incomplete_s3_locations() {
        for input in ["s3://host", "s3://host/bucket", "s3://host/bucket/", "s3:///bucket/key", "s3://host//key", "s3://host/bucket//key"] {
            assert!(
                matches!(Location::parse(input), Err(FileError::InvalidLocation(_))),
                "{input} was accepted"
            );
        }
    }

    #[test]
    fn it_parses_swift_locations() -> TestResult {
        let location = Location::parse("swift://container/path/to/object")?;
        assert_eq!(
            location,
            Location::Swift {
                container: "container".into(),
                key: "path/to/object".into()
            }
        );
        assert_eq!(location.server_url(), None);
        assert_eq!(location.object_path(), "/container/path/to/object");
        assert!(Location::parse("swift://container").is_err());
        assert!(Location::parse("swift://container/").is_err());
        Ok(())
    }

    #[test]
    fn it_rejects_unknown_schemes() {
        assert_eq!(
            Location::parse("ftp://host/file"),
            Err(FileError::UnsupportedScheme("ftp".into()))
        );
        assert!(matches!(
            Location::parse("not a url"),
            Err(FileError::InvalidLocation(_))
        ));
    }
}
