//! Authenticated VPN configuration download.

use std::path::{Path, PathBuf};

use log::{info, warn};
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE};
use serde::Deserialize;

use super::transport::endpoint;
use crate::constants;
use crate::error::DownloadError;
use crate::state::SessionState;

/// Error payload the portal returns on refusal.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Downloads the signed-in user's `.ovpn` configuration into `dest_dir`.
///
/// # Errors
///
/// [`DownloadError::NotAuthenticated`] without an active session; otherwise
/// the portal's refusal, a transport failure, or a write failure.
pub fn download_config(
    client: &Client,
    base_url: &str,
    session: &SessionState,
    dest_dir: &Path,
) -> Result<PathBuf, DownloadError> {
    let credential = session
        .active_credential()
        .ok_or(DownloadError::NotAuthenticated)?;

    let url = endpoint(base_url, constants::DOWNLOAD_CONFIG_PATH);
    let response = client
        .get(&url)
        .timeout(std::time::Duration::from_secs(constants::DOWNLOAD_TIMEOUT_SECS))
        .header(AUTHORIZATION, format!("Bearer {}", credential.bearer()))
        .send()?;

    if !response.status().is_success() {
        let status = response.status();
        let message = response
            .json::<ErrorBody>()
            .map_or_else(|_| status.to_string(), |body| body.error);
        warn!("DOWNLOAD: portal refused ({status}): {message}");
        return Err(DownloadError::Server(message));
    }

    // An HTML page means we were bounced to the sign-in screen.
    if let Some(content_type) = response.headers().get(CONTENT_TYPE) {
        let ct = content_type.to_str().unwrap_or("").to_lowercase();
        if ct.contains("text/html") {
            return Err(DownloadError::HtmlContent);
        }
    }

    let filename = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(filename_from_disposition)
        .unwrap_or_else(|| constants::DEFAULT_CONFIG_FILENAME.to_string());

    let content = response.bytes()?;
    if content.is_empty() {
        return Err(DownloadError::Empty);
    }

    std::fs::create_dir_all(dest_dir)?;
    let target = unique_path(dest_dir, &sanitize_filename(&filename));
    std::fs::write(&target, &content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o600))?;
    }

    info!(
        "DOWNLOAD: saved {} bytes to {}",
        content.len(),
        target.display()
    );
    Ok(target)
}

/// `filename=` value of a `Content-Disposition` header.
fn filename_from_disposition(disposition: &str) -> Option<String> {
    let start = disposition.find("filename=")?;
    let rest = &disposition[start + "filename=".len()..];
    let end = rest.find(';').unwrap_or(rest.len());
    let name = rest[..end].trim().trim_matches('"');
    (!name.is_empty()).then(|| name.to_string())
}

/// Strips path components and enforces the `.ovpn` extension.
fn sanitize_filename(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(constants::DEFAULT_CONFIG_FILENAME);
    if base.ends_with(constants::EXT_OVPN) {
        base.to_string()
    } else {
        format!("{base}{}", constants::EXT_OVPN)
    }
}

/// `dir/name`, or `dir/stem(N).ext` if that already exists.
fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let path = Path::new(name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("client");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("ovpn");

    (1..)
        .map(|n| dir.join(format!("{stem}({n}).{ext}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}
