use tracing::{debug, info};

use crate::device::{ConnectorKind, DisplayDevice};
use crate::error::DiscoveryError;
use crate::scanout::DisplayTarget;

/// Which connectors may be picked as the output.
#[derive(Debug, Clone)]
pub struct OutputPolicy {
	pub accepted: Vec<ConnectorKind>,
}

impl Default for OutputPolicy {
	fn default() -> Self {
		Self {
			accepted: vec![ConnectorKind::HdmiA, ConnectorKind::HdmiB],
		}
	}
}

impl OutputPolicy {
	pub fn accepts(&self, kind: ConnectorKind) -> bool {
		self.accepted.contains(&kind)
	}
}

/// Pick the first connected, accepted connector whose encoder drives a CRTC.
///
/// Only one output is ever used. Candidates without an encoder or whose
/// encoder is idle are skipped.
pub fn find_output<D: DisplayDevice + ?Sized>(
	device: &D,
	policy: &OutputPolicy,
) -> Result<DisplayTarget, DiscoveryError> {
	let mut first_unbound = None;
	for connector in device.connectors()? {
		if !connector.connected || !policy.accepts(connector.kind) {
			continue;
		}
		let Some(encoder) = connector.encoder else {
			debug!(connector = %connector.id, "candidate has no encoder");
			first_unbound.get_or_insert(connector.id);
			continue;
		};
		let Some(crtc) = device.encoder_crtc(encoder)? else {
			debug!(connector = %connector.id, %encoder, "encoder drives no crtc");
			first_unbound.get_or_insert(connector.id);
			continue;
		};
		info!(connector = %connector.id, kind = ?connector.kind, %crtc, "selected output");
		return Ok(DisplayTarget::new(connector.id, crtc));
	}
	Err(match first_unbound {
		Some(connector) => DiscoveryError::NoBoundEncoder(connector),
		None => DiscoveryError::NoConnectedOutput,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::device::{ConnectorId, ConnectorInfo, CrtcId, EncoderId};
	use crate::fake::FakeDevice;

	fn connector(id: u32, kind: ConnectorKind, connected: bool, encoder: Option<u32>) -> ConnectorInfo {
		ConnectorInfo {
			id: ConnectorId(id),
			kind,
			connected,
			encoder: encoder.map(EncoderId),
		}
	}

	#[test]
	fn no_connectors_is_a_failure() {
		let device = FakeDevice::default();
		let err = find_output(&device, &OutputPolicy::default()).unwrap_err();
		assert!(matches!(err, DiscoveryError::NoConnectedOutput));
	}

	#[test]
	fn disconnected_connectors_are_never_selected() {
		let device = FakeDevice::default()
			.with_connector(connector(30, ConnectorKind::HdmiA, false, Some(5)))
			.with_encoder(5, Some(40));
		let err = find_output(&device, &OutputPolicy::default()).unwrap_err();
		assert!(matches!(err, DiscoveryError::NoConnectedOutput));
	}

	#[test]
	fn only_accepted_kinds_are_considered() {
		let device = FakeDevice::default()
			.with_connector(connector(30, ConnectorKind::DisplayPort, true, Some(5)))
			.with_connector(connector(31, ConnectorKind::HdmiB, true, Some(6)))
			.with_encoder(5, Some(40))
			.with_encoder(6, Some(41));
		let target = find_output(&device, &OutputPolicy::default()).unwrap();
		assert_eq!(target.connector, ConnectorId(31));
		assert_eq!(target.crtc, CrtcId(41));
		assert!(target.framebuffer.is_none());
	}

	#[test]
	fn first_resolvable_connector_wins() {
		let device = FakeDevice::default()
			.with_connector(connector(30, ConnectorKind::HdmiA, true, None))
			.with_connector(connector(31, ConnectorKind::HdmiA, true, Some(6)))
			.with_connector(connector(32, ConnectorKind::HdmiA, true, Some(7)))
			.with_encoder(6, None)
			.with_encoder(7, Some(42));
		let target = find_output(&device, &OutputPolicy::default()).unwrap();
		assert_eq!(target.connector, ConnectorId(32));
		assert_eq!(target.crtc, CrtcId(42));
	}

	#[test]
	fn unbound_candidates_are_reported() {
		let device = FakeDevice::default()
			.with_connector(connector(30, ConnectorKind::HdmiA, true, None))
			.with_connector(connector(31, ConnectorKind::HdmiB, true, Some(6)))
			.with_encoder(6, None);
		let err = find_output(&device, &OutputPolicy::default()).unwrap_err();
		assert!(matches!(err, DiscoveryError::NoBoundEncoder(ConnectorId(30))));
	}

	#[test]
	fn custom_policy_widens_the_search() {
		let device = FakeDevice::default()
			.with_connector(connector(30, ConnectorKind::EmbeddedDisplayPort, true, Some(5)))
			.with_encoder(5, Some(40));
		let policy = OutputPolicy {
			accepted: vec![ConnectorKind::EmbeddedDisplayPort],
		};
		assert_eq!(find_output(&device, &policy).unwrap().crtc, CrtcId(40));
	}
}
