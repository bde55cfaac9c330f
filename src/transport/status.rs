//! HTTP status classification for uploads and existence checks.

use crate::error::TransferError;

/// Classifies the status returned for a PUT.
///
/// # Errors
///
/// - 403 → [`TransferError::AuthorizationDenied`]
/// - 404 → [`TransferError::ResourceDoesNotExist`]
/// - anything else outside 200/201/202/204 → [`TransferError::TransferFailed`]
pub fn classify_put_status(status: u16, url: &str) -> Result<(), TransferError> {
    match status {
        200 | 201 | 202 | 204 => Ok(()),
        403 => Err(TransferError::authorization_denied(format!(
            "Access denied to: {url}"
        ))),
        404 => Err(TransferError::resource_does_not_exist(format!(
            "File: {url} does not exist"
        ))),
        other => Err(TransferError::transfer_failed(format!(
            "Failed to transfer file: {url}. Return code is: {other}"
        ))),
    }
}

/// Classifies the status returned for a HEAD.
///
/// Statuses other than 200 and 403 are reported as "does not exist",
/// so a server error reads the same as an absent resource.
///
/// # Errors
///
/// 403 → [`TransferError::AuthorizationDenied`].
pub fn classify_head_status(status: u16, url: &str) -> Result<bool, TransferError> {
    match status {
        200 => Ok(true),
        403 => Err(TransferError::authorization_denied(format!(
            "Access denied to: {url}"
        ))),
        _ => Ok(false),
    }
}
