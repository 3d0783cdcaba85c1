// Image byte sources
//
// The registrar only produces locators; this is where they are turned into
// bytes. Local paths and `file://` URLs are read from disk. http(s) and
// protocol-relative URLs go through reqwest (the default `remote-images`
// feature).

use crate::error::FetchError;
use std::path::Path;

/// Maximum body size accepted for a single remote image.
pub const MAX_REMOTE_IMAGE_BYTES: u64 = 32 * 1024 * 1024;

pub trait ImageFetcher: Send + Sync {
    fn fetch(&self, locator: &str) -> Result<Vec<u8>, FetchError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Locator<'a> {
    File(&'a str),
    Remote(String),
}

fn classify(locator: &str) -> Locator<'_> {
    let low = locator.to_ascii_lowercase();
    if low.starts_with("http://") || low.starts_with("https://") {
        return Locator::Remote(locator.to_string());
    }
    if locator.starts_with("//") {
        return Locator::Remote(format!("https:{locator}"));
    }
    if low.starts_with("file://") {
        return Locator::File(&locator["file://".len()..]);
    }
    Locator::File(locator)
}

#[derive(Debug, Default)]
pub struct DefaultFetcher {
    #[cfg(feature = "remote-images")]
    client: Option<reqwest::blocking::Client>,
}

impl DefaultFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured HTTP client for remote images.
    #[cfg(feature = "remote-images")]
    pub fn with_client(client: reqwest::blocking::Client) -> Self {
        Self { client: Some(client) }
    }

    fn read_file(path: &str) -> Result<Vec<u8>, FetchError> {
        Ok(std::fs::read(Path::new(path))?)
    }

    #[cfg(feature = "remote-images")]
    fn read_remote(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        use std::io::Read;

        let remote = |e: reqwest::Error| FetchError::Remote(e.to_string());
        let response = match &self.client {
            Some(client) => client.get(url).send(),
            None => reqwest::blocking::get(url),
        }
        .and_then(|r| r.error_for_status())
        .map_err(remote)?;

        if let Some(len) = response.content_length() {
            if len > MAX_REMOTE_IMAGE_BYTES {
                return Err(FetchError::Remote(format!(
                    "{url}: body too large (limit {MAX_REMOTE_IMAGE_BYTES} bytes, Content-Length {len} bytes)"
                )));
            }
        }

        let mut out = Vec::new();
        response.take(MAX_REMOTE_IMAGE_BYTES + 1).read_to_end(&mut out)?;
        if out.len() as u64 > MAX_REMOTE_IMAGE_BYTES {
            return Err(FetchError::Remote(format!(
                "{url}: body too large (limit {MAX_REMOTE_IMAGE_BYTES} bytes)"
            )));
        }
        Ok(out)
    }

    #[cfg(not(feature = "remote-images"))]
    fn read_remote(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
        Err(FetchError::RemoteDisabled)
    }
}

impl ImageFetcher for DefaultFetcher {
    fn fetch(&self, locator: &str) -> Result<Vec<u8>, FetchError> {
        match classify(locator) {
            Locator::File(path) => Self::read_file(path),
            Locator::Remote(url) => self.read_remote(&url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn classifies_locators() {
        assert_eq!(classify("/srv/a.png"), Locator::File("/srv/a.png"));
        assert_eq!(classify("file:///srv/a.png"), Locator::File("/srv/a.png"));
        assert_eq!(classify("HTTPS://x/a.png"), Locator::Remote("HTTPS://x/a.png".into()));
        assert_eq!(classify("//cdn/a.png"), Locator::Remote("https://cdn/a.png".into()));
    }

    #[test]
    fn reads_local_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\x89PNG").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let fetcher = DefaultFetcher::new();
        assert_eq!(fetcher.fetch(&path).unwrap(), b"\x89PNG");
        assert_eq!(fetcher.fetch(&format!("file://{path}")).unwrap(), b"\x89PNG");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.png");
        let err = DefaultFetcher::new().fetch(missing.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, FetchError::Io(_)));
    }

    #[cfg(not(feature = "remote-images"))]
    #[test]
    fn remote_needs_the_feature() {
        let err = DefaultFetcher::new().fetch("https://example.com/a.png").unwrap_err();
        assert!(matches!(err, FetchError::RemoteDisabled));
    }

    #[cfg(feature = "remote-images")]
    fn serve_once(response: &'static [u8]) -> (String, std::thread::JoinHandle<()>) {
        use std::io::{BufRead, BufReader};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap() > 0 && line != "\r\n" {
                line.clear();
            }
            stream.write_all(response).unwrap();
        });
        (format!("http://{addr}"), server)
    }

    #[cfg(feature = "remote-images")]
    fn local_fetcher() -> DefaultFetcher {
        DefaultFetcher::with_client(reqwest::blocking::Client::builder().no_proxy().build().unwrap())
    }

    #[cfg(feature = "remote-images")]
    #[test]
    fn fetches_over_http() {
        let (base, server) = serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\nConnection: close\r\n\r\nGIF8");
        let bytes = local_fetcher().fetch(&format!("{base}/a.gif")).unwrap();
        assert_eq!(bytes, b"GIF8");
        server.join().unwrap();
    }

    #[cfg(feature = "remote-images")]
    #[test]
    fn http_errors_are_remote_failures() {
        let (base, server) = serve_once(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        let err = local_fetcher().fetch(&format!("{base}/gone.png")).unwrap_err();
        assert!(matches!(err, FetchError::Remote(_)));
        server.join().unwrap();
    }
}
