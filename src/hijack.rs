use crate::error::Error;
use http::Request;
use hyper::upgrade::OnUpgrade;

/// Takes the connection-takeover capability out of `req`.
///
/// Servers that support hijacking (hyper's HTTP/1 stack with upgrades
/// enabled) attach an [`OnUpgrade`] handle to each request that may switch
/// protocols. The handle resolves to the raw connection once the `101`
/// response has been written; the raw stream bypasses this crate entirely,
/// since informational responses pass through uncompressed.
///
/// Fails with [`Error::HijackUnsupported`] when the underlying connection
/// offers no such capability.
///
/// ```ignore
/// let upgrade = tower_gzip::hijack(&mut req)?;
/// tokio::spawn(async move {
///     let io = upgrade.await?;
///     // speak the upgraded protocol on the raw connection
/// });
/// ```
pub fn hijack<B>(req: &mut Request<B>) -> Result<OnUpgrade, Error> {
    req.extensions_mut()
        .remove::<OnUpgrade>()
        .ok_or(Error::HijackUnsupported)
}
