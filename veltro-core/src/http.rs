//! Server-agnostic request/response seams.
//!
//! `veltro-core` never depends on a concrete HTTP server. Instead it is
//! driven through these two traits; `veltro-runtime` owns the `hyper`
//! adapter that implements them over a real socket, and tests drive the
//! core through a trivial in-memory adapter.

/// Borrowed view over an inbound HTTP request.
///
/// Every accessor returns a byte slice borrowed from the underlying
/// connection buffer — valid only for the lifetime `'r` of the request,
/// which is also the lifetime threaded through `Context<'r>`.
pub trait Request<'r> {
    fn method_bytes(&self) -> &'r [u8];
    fn path_bytes(&self) -> &'r [u8];
    /// Raw query string, without the leading `?`. Empty slice if absent.
    fn query_bytes(&self) -> &'r [u8];
    fn header_get(&self, name: &str) -> Option<&'r [u8]>;
    /// Whole request body. Bounded: the adapter is responsible for
    /// enforcing a size limit before handing this to the core.
    fn body_bytes(&self) -> &'r [u8];
}

/// Write sink for an outbound HTTP response.
pub trait ResponseWriter {
    fn set_header(&mut self, name: &[u8], value: &[u8]);
    fn write_status(&mut self, code: u16);
    fn write_body(&mut self, bytes: &[u8]);
}
