//! ConsoleApiRouter: turns request frames into session operations and reply
//! frames.
//!
//! | API          | Operation                                           |
//! |--------------|-----------------------------------------------------|
//! | `Connect`    | validate the record, then attach or allocate        |
//! | `Disconnect` | detach the calling process                          |
//! | `GetLangId`  | language id of the session's output code page       |
//! | `Deprecated` | revalidate and reply `Unsuccessful`                 |
//!
//! Every operation other than `Connect` revalidates the session and the
//! calling process first; either missing yields `InvalidHandle`.

use std::sync::Arc;

use conhost_core::protocol::messages::{ApiKind, ApiReply, ApiRequest, StatusCode};
use conhost_core::{decode_connect_info, decode_request, encode_reply};
use tracing::{debug, warn};

use crate::application::bootstrap::SessionBootstrap;
use crate::application::session::{SessionError, SessionLock};

/// The command-handler seam of the service loop.
pub trait CommandDispatcher: Send {
    /// Handles one request frame and returns the reply frame.
    fn dispatch(&mut self, request: &[u8]) -> Vec<u8>;
}

/// [`CommandDispatcher`] for the console API numbers.
pub struct ConsoleApiRouter {
    bootstrap: Arc<SessionBootstrap>,
    lock: Arc<SessionLock>,
}

impl ConsoleApiRouter {
    pub fn new(bootstrap: Arc<SessionBootstrap>) -> Self {
        let lock = Arc::clone(bootstrap.session_lock());
        Self { bootstrap, lock }
    }

    /// Handles one decoded request.
    pub fn handle(&self, request: &ApiRequest) -> ApiReply {
        let id = request.request_id;
        let result = match request.api {
            ApiKind::Connect => return self.connect(request),
            ApiKind::Disconnect => self
                .lock
                .with_session(|s| s.remove_process(request.process))
                .and_then(|r| r)
                .map(|()| Vec::new()),
            ApiKind::GetLangId => self
                .lock
                .with_session(|s| s.require_process(request.process).map(|_| s.lang_id()))
                .and_then(|r| r)
                .map(|lang_id| lang_id.to_le_bytes().to_vec()),
            ApiKind::Deprecated => {
                return match self
                    .lock
                    .with_session(|s| s.require_process(request.process).map(|_| ()))
                    .and_then(|r| r)
                {
                    Ok(()) => ApiReply::status(id, StatusCode::Unsuccessful),
                    Err(e) => ApiReply::status(id, e.status()),
                };
            }
        };

        match result {
            Ok(payload) => ApiReply::success(id, payload),
            Err(e) => {
                debug!(api = ?request.api, process = %request.process, "request failed: {e}");
                ApiReply::status(id, e.status())
            }
        }
    }

    fn connect(&self, request: &ApiRequest) -> ApiReply {
        let id = request.request_id;
        let info = match decode_connect_info(&request.payload) {
            Ok(info) => info,
            Err(e) => {
                warn!(process = %request.process, "malformed connection request rejected: {e}");
                return ApiReply::status(id, StatusCode::InvalidParameter);
            }
        };

        let attached = self
            .lock
            .with_session(|s| s.attach_process(request.process, info.process_group_id));
        let result = match attached {
            Ok(()) => Ok(()),
            Err(SessionError::NoSession) => {
                self.bootstrap.allocate(request.process, &info).map(|_| ())
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => ApiReply::status(id, StatusCode::Success),
            Err(e) => {
                warn!(process = %request.process, "connect failed: {e}");
                ApiReply::status(id, e.status())
            }
        }
    }
}

impl CommandDispatcher for ConsoleApiRouter {
    fn dispatch(&mut self, request: &[u8]) -> Vec<u8> {
        let reply = match decode_request(request) {
            Ok(request) => self.handle(&request),
            Err(e) => {
                warn!("undecodable request frame: {e}");
                ApiReply::status(0, StatusCode::InvalidParameter)
            }
        };
        encode_reply(&reply)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::resolve_config::{
        ConfigResolver, MockConfigStore, MockShortcutResolver,
    };
    use crate::infrastructure::display::{HeadlessDisplayScaling, ProcessSetup};
    use crate::infrastructure::render::NullRenderer;
    use crate::infrastructure::window::HeadlessWindowHost;
    use conhost_core::protocol::messages::ProcessHandle;
    use conhost_core::protocol::{decode_reply, encode_connect_request, encode_request, ConnectRequest};
    use conhost_core::PartialConfig;

    fn router_with_code_page(code_page: u32) -> ConsoleApiRouter {
        let mut store = MockConfigStore::new();
        store.expect_load_global_defaults().returning(move || {
            Ok(PartialConfig {
                code_page: Some(code_page),
                ..PartialConfig::default()
            })
        });
        store
            .expect_load_default_record()
            .returning(|| Ok(PartialConfig::default()));
        store
            .expect_load_by_title()
            .returning(|_| Ok(PartialConfig::default()));
        let mut shortcuts = MockShortcutResolver::new();
        shortcuts.expect_resolve().never();

        let bootstrap = SessionBootstrap::new(
            Arc::new(SessionLock::new()),
            ConfigResolver::new(Box::new(store), Box::new(shortcuts), 437, None),
            Arc::new(ProcessSetup::new(Box::new(HeadlessDisplayScaling))),
            Arc::new(HeadlessWindowHost::new()),
            Arc::new(NullRenderer::new()),
            None,
        );
        ConsoleApiRouter::new(Arc::new(bootstrap))
    }

    fn request(api: ApiKind, process: u64, request_id: u64, payload: Vec<u8>) -> ApiRequest {
        ApiRequest {
            api,
            process: ProcessHandle(process),
            request_id,
            payload,
        }
    }

    fn connect_request(process: u64) -> ApiRequest {
        let record = encode_connect_request(&ConnectRequest {
            title: "router".to_string(),
            ..ConnectRequest::default()
        });
        request(ApiKind::Connect, process, process, record)
    }

    #[test]
    fn test_connect_allocates_then_attaches() {
        // Arrange
        let router = router_with_code_page(437);

        // Act
        let first = router.handle(&connect_request(1));
        let second = router.handle(&connect_request(2));

        // Assert
        assert_eq!(first.status, StatusCode::Success);
        assert_eq!(second.status, StatusCode::Success);
        let count = router.lock.with_session(|s| s.processes().len()).expect("live");
        assert_eq!(count, 2);
    }

    #[test]
    fn test_malformed_connect_is_invalid_parameter_without_session() {
        let router = router_with_code_page(437);
        let mut record = encode_connect_request(&ConnectRequest::default());
        record[40..44].copy_from_slice(&u32::MAX.to_le_bytes());

        let reply = router.handle(&request(ApiKind::Connect, 1, 5, record));

        assert_eq!(reply, ApiReply::status(5, StatusCode::InvalidParameter));
        assert!(!router.lock.is_live());
    }

    #[test]
    fn test_get_lang_id_reports_session_code_page() {
        let router = router_with_code_page(932);
        router.handle(&connect_request(1));

        let reply = router.handle(&request(ApiKind::GetLangId, 1, 9, Vec::new()));

        assert_eq!(reply, ApiReply::success(9, 0x0411u16.to_le_bytes().to_vec()));
    }

    #[test]
    fn test_requests_without_session_are_invalid_handle() {
        let router = router_with_code_page(437);
        for api in [ApiKind::Disconnect, ApiKind::GetLangId, ApiKind::Deprecated] {
            let reply = router.handle(&request(api, 1, 3, Vec::new()));
            assert_eq!(reply.status, StatusCode::InvalidHandle, "{api:?}");
        }
    }

    #[test]
    fn test_unknown_process_is_invalid_handle() {
        let router = router_with_code_page(437);
        router.handle(&connect_request(1));

        let reply = router.handle(&request(ApiKind::GetLangId, 42, 3, Vec::new()));

        assert_eq!(reply.status, StatusCode::InvalidHandle);
    }

    #[test]
    fn test_deprecated_api_is_unsuccessful() {
        let router = router_with_code_page(437);
        router.handle(&connect_request(1));

        let reply = router.handle(&request(ApiKind::Deprecated, 1, 4, Vec::new()));

        assert_eq!(reply, ApiReply::status(4, StatusCode::Unsuccessful));
    }

    #[test]
    fn test_disconnect_detaches_but_keeps_session() {
        // Arrange
        let router = router_with_code_page(437);
        router.handle(&connect_request(1));

        // Act
        let reply = router.handle(&request(ApiKind::Disconnect, 1, 6, Vec::new()));

        // Assert
        assert_eq!(reply.status, StatusCode::Success);
        assert!(router.lock.is_live());
        let again = router.handle(&request(ApiKind::Disconnect, 1, 7, Vec::new()));
        assert_eq!(again.status, StatusCode::InvalidHandle);
    }

    #[test]
    fn test_undecodable_frame_gets_invalid_parameter_with_request_id_zero() {
        let mut router = router_with_code_page(437);

        let reply = decode_reply(&router.dispatch(&[0xFF, 0x00])).expect("reply");

        assert_eq!(reply, ApiReply::status(0, StatusCode::InvalidParameter));
    }

    #[test]
    fn test_dispatch_round_trips_request_id() {
        let mut router = router_with_code_page(437);
        let frame = encode_request(&connect_request(11));

        let reply = decode_reply(&router.dispatch(&frame)).expect("reply");

        assert_eq!(reply.request_id, 11);
        assert_eq!(reply.status, StatusCode::Success);
    }
}
