use std::io;

use nimbus_auth::Options;
use nimbus_http::range::ByteRange;
use nimbus_http::{Method, StatusCode};

use crate::channel::Channel;
use crate::{Config, FileError, Location};

/// Reference point for [`RemoteFile::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// From the start of the object, shifted by the archive offset
    Begin,
    /// From the current cursor
    Current,
    /// From the end of the object
    End,
}

/// Counters for successful reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Total bytes delivered
    pub bytes_read: u64,
    /// Number of ranged reads that succeeded
    pub read_calls: u64,
}

/// A remote object read through ranged HTTP requests.
///
/// Opening a file resolves credentials, binds a session to the object's
/// server and learns the object size from a `HEAD` request. Every read is a
/// single `GET` with a `Range` header that must be answered with exactly the
/// requested bytes.
#[derive(Debug)]
pub struct RemoteFile {
    location: Location,
    channel: Option<Channel>,
    size: u64,
    offset: u64,
    archive_offset: u64,
    accepts_ranges: bool,
    stats: ReadStats,
}

impl RemoteFile {
    /// Opens the object at `url`.
    ///
    /// `options` is a space separated list such as
    /// `AUTH=<access>:<secret> NOPROXY`.
    pub fn open(url: &str, options: &str, config: &Config) -> Result<Self, FileError> {
        let location = Location::parse(url)?;
        let options = Options::parse(options)?;
        for option in options.unrecognized() {
            tracing::debug!(option, "Ignoring unrecognized option");
        }

        let proxy = config.resolve_proxy(&options);
        let channel = Channel::open(&location, &options, config, proxy.as_ref())?;
        let anonymous_s3 = channel.is_anonymous_s3();

        let mut file = RemoteFile {
            location,
            channel: Some(channel),
            size: 0,
            offset: 0,
            archive_offset: 0,
            accepts_ranges: false,
            stats: ReadStats::default(),
        };

        if let Err(error) = file.discover_size() {
            if anonymous_s3 {
                tracing::error!(
                    %error,
                    "Cannot access {} without credentials; provide them with the AUTH=<access>:<secret> \
                     or S3_ACCESS_KEY=<access> S3_SECRET_KEY=<secret> options, or the S3_ACCESS_KEY \
                     and S3_SECRET_KEY environment variables",
                    file.location
                );
            }
            return Err(error);
        }

        tracing::debug!(
            location = %file.location,
            size = file.size,
            accepts_ranges = file.accepts_ranges,
            "Opened remote file"
        );
        Ok(file)
    }

    fn discover_size(&mut self) -> Result<(), FileError> {
        let path = self.location.object_path();
        let channel = self.channel.as_mut().ok_or(FileError::Closed)?;
        let mut request = channel.request(Method::HEAD, &path, self.location.query())?;
        request.submit()?;

        let status = request.status().map(|status| status.as_u16()).unwrap_or_default();
        if status != StatusCode::OK.as_u16() {
            return Err(FileError::SizeDiscovery {
                url: self.location.to_string(),
                status,
            });
        }

        self.size = request
            .response_body_length()
            .ok_or_else(|| FileError::MissingContentLength(self.location.to_string()))?;
        self.accepts_ranges = request
            .response_header("accept-ranges")
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("bytes"));
        Ok(())
    }

    /// The object location.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// The object size learned at open time.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The cursor used by [`RemoteFile::read`].
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Whether the server advertised `Accept-Ranges: bytes`.
    pub fn accepts_ranges(&self) -> bool {
        self.accepts_ranges
    }

    /// Whether reads are batched into multi-range requests. They never are;
    /// see [`nimbus_http::range::ByteRanges`] for building such a request.
    pub fn multi_range(&self) -> bool {
        false
    }

    /// Counters for successful reads.
    pub fn stats(&self) -> ReadStats {
        self.stats
    }

    /// Start of the object inside an enclosing archive. Shifts
    /// [`Whence::Begin`] seeks.
    pub fn archive_offset(&self) -> u64 {
        self.archive_offset
    }

    /// Sets the start of the object inside an enclosing archive.
    pub fn set_archive_offset(&mut self, offset: u64) {
        self.archive_offset = offset;
    }

    /// Whether [`RemoteFile::close`] has not been called yet.
    pub fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    /// `host:port` of the server currently bound, or `<none>:<0000>`.
    pub fn host_and_port(&self) -> String {
        match &self.channel {
            Some(channel) => channel.session().host_and_port(),
            None => "<none>:<0000>".to_string(),
        }
    }

    /// Fills `buffer` from the cursor and advances it.
    pub fn read(&mut self, buffer: &mut [u8]) -> Result<(), FileError> {
        self.read_range(self.offset, buffer)
    }

    /// Fills `buffer` with the bytes at `offset`, counted from the archive
    /// offset.
    ///
    /// An empty buffer succeeds without a request. A range that runs past the
    /// end of the object fails without a request. On success the cursor
    /// moves to the end of the range; on failure it stays put.
    pub fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> Result<(), FileError> {
        let position = self
            .archive_offset
            .checked_add(offset)
            .ok_or(FileError::OutOfBounds {
                offset,
                length: buffer.len() as u64,
                size: self.size,
            })?;
        self.read_range(position, buffer)
    }

    fn read_range(&mut self, offset: u64, buffer: &mut [u8]) -> Result<(), FileError> {
        let channel = self.channel.as_mut().ok_or(FileError::Closed)?;
        if buffer.is_empty() {
            return Ok(());
        }

        let length = buffer.len() as u64;
        let range = ByteRange::new(offset, length)
            .filter(|range| range.last() < self.size)
            .ok_or(FileError::OutOfBounds {
                offset,
                length,
                size: self.size,
            })?;

        let path = self.location.object_path();
        let mut request = channel.request(Method::GET, &path, self.location.query())?;
        request.set_header("Range", range.header_value());
        request.submit()?;

        let status = request.status().map(|status| status.as_u16()).unwrap_or_default();
        if status != StatusCode::PARTIAL_CONTENT.as_u16() {
            tracing::warn!(status, range = %range, "Server did not honor range request");
            return Err(FileError::RangeNotHonored { status });
        }

        let declared = request.response_body_length();
        if declared != Some(length) {
            return Err(FileError::LengthMismatch {
                expected: length,
                declared,
            });
        }

        let actual = request.read_body(buffer)? as u64;
        if actual != length {
            return Err(FileError::ShortBody {
                expected: length,
                actual,
            });
        }

        self.offset = offset + length;
        self.stats.bytes_read += length;
        self.stats.read_calls += 1;
        tracing::trace!(offset, length, "Read range");
        Ok(())
    }

    /// Reads each `(offset, length)` range into consecutive slices of
    /// `buffer`, one request per range, stopping at the first failure.
    /// Offsets are counted from the archive offset as in
    /// [`RemoteFile::read_at`].
    pub fn read_buffers(&mut self, buffer: &mut [u8], ranges: &[(u64, usize)]) -> Result<(), FileError> {
        let available = buffer.len() as u64;
        let needed = ranges
            .iter()
            .try_fold(0u64, |total, (_, length)| total.checked_add(*length as u64));
        match needed {
            Some(needed) if needed <= available => {}
            needed => {
                return Err(FileError::BufferTooSmall {
                    needed: needed.unwrap_or(u64::MAX),
                    available,
                });
            }
        }

        let mut start = 0usize;
        for &(offset, length) in ranges {
            let end = start
                .checked_add(length)
                .filter(|end| *end <= buffer.len())
                .ok_or(FileError::BufferTooSmall {
                    needed: u64::MAX,
                    available,
                })?;
            self.read_at(offset, &mut buffer[start..end])?;
            start = end;
        }
        Ok(())
    }

    /// Moves the cursor and returns its new position.
    ///
    /// [`Whence::End`] is rejected while an archive offset is set.
    pub fn seek(&mut self, delta: i64, whence: Whence) -> Result<u64, FileError> {
        if self.channel.is_none() {
            return Err(FileError::Closed);
        }
        let base = match whence {
            Whence::Begin => self.archive_offset,
            Whence::Current => self.offset,
            Whence::End if self.archive_offset != 0 => {
                return Err(FileError::InvalidSeek(
                    "seeking from the end is not supported inside an archive".into(),
                ));
            }
            Whence::End => self.size,
        };

        let position = i128::from(base) + i128::from(delta);
        self.offset = u64::try_from(position)
            .map_err(|_| FileError::InvalidSeek(format!("position {position} is out of range")))?;
        Ok(self.offset)
    }

    /// Closes the connection. Later reads fail with [`FileError::Closed`];
    /// closing again does nothing.
    pub fn close(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.session_mut().terminate();
            tracing::debug!(location = %self.location, stats = ?self.stats, "Closed remote file");
        }
    }
}

impl io::Read for RemoteFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.size.saturating_sub(self.offset);
        let count = usize::try_from(remaining).map_or(buf.len(), |remaining| remaining.min(buf.len()));
        RemoteFile::read(self, &mut buf[..count]).map_err(io::Error::other)?;
        Ok(count)
    }
}

impl io::Seek for RemoteFile {
    fn seek(&mut self, position: io::SeekFrom) -> io::Result<u64> {
        let (delta, whence) = match position {
            io::SeekFrom::Start(offset) => (
                i64::try_from(offset).map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error))?,
                Whence::Begin,
            ),
            io::SeekFrom::Current(delta) => (delta, Whence::Current),
            io::SeekFrom::End(delta) => (delta, Whence::End),
        };
        RemoteFile::seek(self, delta, whence).map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error))
    }
}
