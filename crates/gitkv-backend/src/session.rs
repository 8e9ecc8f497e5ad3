//! Transport session lifecycle.
//!
//! A `Session` binds an endpoint URL and credentials for the lifetime
//! of the backend, handing out short-lived `Connection`s per protocol
//! exchange (the v0 half-protocols are one-shot: upload-pack exits
//! after serving a fetch, receive-pack after a push).

use bstr::BString;
use gitkv_hash::ObjectId;
use gitkv_protocol::advertise::{parse_advertisement, Advertisement};
use gitkv_protocol::capability::Capabilities;
use gitkv_protocol::pktline::PktReader;
use gitkv_protocol::push::{PushReport, RefUpdate};
use gitkv_protocol::{fetch, push};
use gitkv_store::MemoryStore;
use gitkv_transport::{connect, Credentials, GitUrl, Service, Transport};

use crate::context::OpContext;
use crate::error::ApiError;

/// Connection factory for the two service flavors.
#[derive(Debug)]
pub struct Session {
    url: GitUrl,
    credentials: Credentials,
}

impl Session {
    /// Parse the endpoint and bind credentials.
    ///
    /// Fails with a `Config`-kind error on an unknown scheme or
    /// unparseable URL.
    pub fn open(endpoint: &str, credentials: Credentials) -> Result<Self, ApiError> {
        let url = GitUrl::parse(endpoint)?;
        Ok(Self { url, credentials })
    }

    pub fn url(&self) -> &GitUrl {
        &self.url
    }

    /// Handshake an upload-pack connection (refs + fetch).
    pub fn read_connection(&self, ctx: &OpContext) -> Result<Connection, ApiError> {
        self.connect(ctx, Service::UploadPack)
    }

    /// Handshake a receive-pack connection (push).
    pub fn write_connection(&self, ctx: &OpContext) -> Result<Connection, ApiError> {
        self.connect(ctx, Service::ReceivePack)
    }

    fn connect(&self, ctx: &OpContext, service: Service) -> Result<Connection, ApiError> {
        ctx.check()?;
        let mut transport = connect(&self.url, service, &self.credentials)?;
        let advertisement = {
            let mut reader = PktReader::new(transport.reader());
            parse_advertisement(&mut reader)?
        };
        ctx.check()?;
        tracing::debug!(
            service = service.as_str(),
            refs = advertisement.refs.len(),
            "connection established"
        );
        Ok(Connection {
            service,
            transport,
            advertisement,
        })
    }
}

/// A handshaked connection to one service.
pub struct Connection {
    service: Service,
    transport: Box<dyn Transport>,
    advertisement: Advertisement,
}

impl Connection {
    /// Advertised refs, in server order.
    pub fn refs(&self) -> &[(ObjectId, BString)] {
        &self.advertisement.refs
    }

    /// OID of a ref by exact name.
    pub fn ref_oid(&self, name: &str) -> Option<ObjectId> {
        self.advertisement.ref_oid(name)
    }

    /// Capabilities recorded during the handshake.
    pub fn capabilities(&self) -> &Capabilities {
        &self.advertisement.capabilities
    }

    /// Fetch the given objects into `store`.
    ///
    /// Returns the number of objects deposited; zero is success ("no
    /// new objects").
    pub fn fetch(
        &mut self,
        ctx: &OpContext,
        store: &MemoryStore,
        wants: &[ObjectId],
        filter_blobs: bool,
    ) -> Result<usize, ApiError> {
        ctx.check()?;
        let outcome = fetch::fetch(
            self.transport.as_mut(),
            &self.advertisement.capabilities,
            wants,
            filter_blobs,
            store,
        )?;
        ctx.check()?;
        Ok(outcome.objects_indexed)
    }

    /// Push one ref update with a pack, atomically where supported.
    pub fn push(
        &mut self,
        ctx: &OpContext,
        update: &RefUpdate,
        pack_data: &[u8],
        atomic: bool,
    ) -> Result<PushReport, ApiError> {
        ctx.check()?;
        let report = push::push(
            self.transport.as_mut(),
            &self.advertisement.capabilities,
            update,
            pack_data,
            atomic,
        )?;
        ctx.check()?;
        Ok(report)
    }

    /// Tear down the underlying transport; failures are logged only.
    pub fn close(self) {
        if let Err(e) = self.transport.close() {
            tracing::debug!(service = self.service.as_str(), error = %e, "transport close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn open_parses_endpoint() {
        let session = Session::open("https://example.com/org/repo.git", Credentials::None).unwrap();
        assert_eq!(session.url().to_string(), "https://example.com/org/repo.git");
    }

    #[test]
    fn open_rejects_unknown_scheme_as_config() {
        let err = Session::open("ftp://example.com/repo.git", Credentials::None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn open_rejects_garbage_as_config() {
        let err = Session::open("", Credentials::None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
