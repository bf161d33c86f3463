//! Subscription client: the one outbound request of the monitor.
use std::sync::Arc;

use bond_common::Result;
use bond_common::hub::SUBSCRIBE_REQUEST;
use log::{error, info};
use serde_json::Value;

use crate::model::state::SessionState;
use crate::transport::HubTransport;

/// Issues `SubscribeToInstruments` over the session's transport.
///
/// The resulting acknowledgement arrives asynchronously on the
/// `SubscriptionSuccessful` channel; this client never writes to the message log.
#[derive(Clone)]
pub struct SubscriptionClient {
    transport: Arc<dyn HubTransport>,
    state: Arc<SessionState>,
}

impl SubscriptionClient {
    /// Client that invokes over `transport` and reports failures to `state`.
    pub fn new(transport: Arc<dyn HubTransport>, state: Arc<SessionState>) -> Self {
        Self { transport, state }
    }

    /// Subscribe to `instrument_ids`.
    ///
    /// Never fails to the caller: a failed request is logged and reported to the
    /// view as `ViewUpdate::RequestFailed`.
    pub fn subscribe_to_instruments(&self, instrument_ids: &[String]) {
        if let Err(e) = self.try_subscribe(instrument_ids) {
            error!("{} failed: {}", SUBSCRIBE_REQUEST, e);
            if let Err(report) = self
                .state
                .report_request_failure(SUBSCRIBE_REQUEST, e.to_string())
            {
                error!("Could not report {} failure: {}", SUBSCRIBE_REQUEST, report);
            }
        }
    }

    /// Send the request and wait for its completion.
    pub fn try_subscribe(&self, instrument_ids: &[String]) -> Result<()> {
        info!("Invoking {} for {:?}", SUBSCRIBE_REQUEST, instrument_ids);
        let ids = Value::from(instrument_ids.to_vec());
        self.transport.invoke(SUBSCRIBE_REQUEST, vec![ids])?;
        info!("{} completed", SUBSCRIBE_REQUEST);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::state::ViewUpdate;
    use crate::transport::fake::FakeTransport;
    use serde_json::json;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_sends_single_array_argument() {
        let transport = Arc::new(FakeTransport::new());
        transport.start().unwrap();
        let state = Arc::new(SessionState::new());
        let client = SubscriptionClient::new(transport.clone(), Arc::clone(&state));

        client.subscribe_to_instruments(&ids(&["instrumentId1", "instrumentId2"]));

        assert_eq!(
            transport.invocations(),
            vec![(
                "SubscribeToInstruments".to_string(),
                vec![json!(["instrumentId1", "instrumentId2"])]
            )]
        );
        assert!(state.messages().unwrap().is_empty());
    }

    #[test]
    fn test_empty_list_rejected_remotely_does_not_fail_locally() {
        let transport = Arc::new(FakeTransport::rejecting_invocations("no instruments"));
        transport.start().unwrap();
        let state = Arc::new(SessionState::new());
        let updates = state.watch().unwrap();
        let client = SubscriptionClient::new(transport.clone(), Arc::clone(&state));

        client.subscribe_to_instruments(&[]);

        assert_eq!(
            transport.invocations(),
            vec![("SubscribeToInstruments".to_string(), vec![json!([])])]
        );
        match updates.try_recv().unwrap() {
            ViewUpdate::RequestFailed { request, cause } => {
                assert_eq!(request, "SubscribeToInstruments");
                assert!(cause.contains("no instruments"));
            }
            other => panic!("unexpected update {:?}", other),
        }
    }

    #[test]
    fn test_unconnected_transport_is_reported() {
        let transport = Arc::new(FakeTransport::new());
        let state = Arc::new(SessionState::new());
        let updates = state.watch().unwrap();
        let client = SubscriptionClient::new(transport.clone(), Arc::clone(&state));

        assert!(client.try_subscribe(&ids(&["A"])).is_err());
        client.subscribe_to_instruments(&ids(&["A"]));

        assert!(transport.invocations().is_empty());
        assert!(matches!(updates.try_recv().unwrap(), ViewUpdate::RequestFailed { .. }));
    }
}
