//! Scriptable in-memory display device for unit tests.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;

use nix::errno::Errno;

use crate::device::{
	ConnectorId, ConnectorInfo, CrtcId, CrtcState, DisplayDevice, EncoderId, FlipEvent,
	FramebufferId, FramebufferLayout, Readiness,
};
use crate::error::{CommitRejection, DisplayError};

/// Route engine logs to the test harness; `RUST_LOG=debug` shows the flip loop.
pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeMode(pub &'static str);

/// What the next `wait_for_events` call should produce.
#[derive(Debug, Clone)]
pub enum FakeWait {
	Timeout,
	Events(Vec<FlipEvent>),
	Fail(Errno),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
	AddFramebuffer(FramebufferId),
	RemoveFramebuffer(FramebufferId),
	RequestFlip(CrtcId, FramebufferId),
	CrtcState(CrtcId),
	SetCrtc {
		crtc: CrtcId,
		framebuffer: FramebufferId,
		connector: ConnectorId,
	},
	Wait,
	Dispatch,
}

#[derive(Debug, Default)]
pub struct FakeDevice {
	connectors: Vec<ConnectorInfo>,
	encoders: HashMap<EncoderId, Option<CrtcId>>,
	crtcs: HashMap<CrtcId, CrtcState<FakeMode>>,
	flips: RefCell<VecDeque<Result<(), CommitRejection>>>,
	waits: RefCell<VecDeque<FakeWait>>,
	pending: RefCell<Vec<FlipEvent>>,
	live: RefCell<BTreeSet<FramebufferId>>,
	next_fb: Cell<u32>,
	refuse_mode_set: bool,
	calls: RefCell<Vec<Call>>,
	pub layouts: RefCell<Vec<FramebufferLayout>>,
}

impl FakeDevice {
	pub fn with_connector(mut self, connector: ConnectorInfo) -> Self {
		self.connectors.push(connector);
		self
	}

	pub fn with_encoder(mut self, encoder: u32, crtc: Option<u32>) -> Self {
		self.encoders.insert(EncoderId(encoder), crtc.map(CrtcId));
		self
	}

	pub fn with_crtc(mut self, crtc: u32, mode: Option<FakeMode>) -> Self {
		self.crtcs.insert(
			CrtcId(crtc),
			CrtcState {
				position: (0, 0),
				mode,
			},
		);
		self
	}

	/// Make every `set_crtc` fail as the kernel does for a bad configuration.
	pub fn refusing_mode_set(mut self) -> Self {
		self.refuse_mode_set = true;
		self
	}

	pub fn script_flip(&self, result: Result<(), CommitRejection>) -> &Self {
		self.flips.borrow_mut().push_back(result);
		self
	}

	pub fn script_wait(&self, wait: FakeWait) -> &Self {
		self.waits.borrow_mut().push_back(wait);
		self
	}

	pub fn calls(&self) -> Vec<Call> {
		self.calls.borrow().clone()
	}

	pub fn clear_calls(&self) {
		self.calls.borrow_mut().clear();
	}

	pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
		self.calls.borrow().iter().filter(|call| pred(call)).count()
	}

	pub fn live_framebuffers(&self) -> Vec<FramebufferId> {
		self.live.borrow().iter().copied().collect()
	}

	fn log(&self, call: Call) {
		self.calls.borrow_mut().push(call);
	}
}

fn einval(op: &'static str) -> DisplayError {
	DisplayError::Io {
		op,
		source: std::io::Error::from_raw_os_error(Errno::EINVAL as i32),
	}
}

impl DisplayDevice for FakeDevice {
	type Mode = FakeMode;

	fn connectors(&self) -> Result<Vec<ConnectorInfo>, DisplayError> {
		Ok(self.connectors.clone())
	}

	fn encoder_crtc(&self, encoder: EncoderId) -> Result<Option<CrtcId>, DisplayError> {
		self
			.encoders
			.get(&encoder)
			.copied()
			.ok_or_else(|| einval("get encoder"))
	}

	fn add_framebuffer(&self, layout: &FramebufferLayout) -> Result<FramebufferId, DisplayError> {
		let id = FramebufferId(self.next_fb.get() + 100);
		self.next_fb.set(self.next_fb.get() + 1);
		self.live.borrow_mut().insert(id);
		self.layouts.borrow_mut().push(*layout);
		self.log(Call::AddFramebuffer(id));
		Ok(id)
	}

	fn remove_framebuffer(&self, framebuffer: FramebufferId) -> Result<(), DisplayError> {
		self.log(Call::RemoveFramebuffer(framebuffer));
		if self.live.borrow_mut().remove(&framebuffer) {
			Ok(())
		} else {
			Err(einval("remove framebuffer"))
		}
	}

	fn request_flip(&self, crtc: CrtcId, framebuffer: FramebufferId) -> Result<(), CommitRejection> {
		self.log(Call::RequestFlip(crtc, framebuffer));
		self.flips.borrow_mut().pop_front().unwrap_or(Ok(()))
	}

	fn crtc_state(&self, crtc: CrtcId) -> Result<CrtcState<FakeMode>, DisplayError> {
		self.log(Call::CrtcState(crtc));
		self.crtcs.get(&crtc).cloned().ok_or_else(|| einval("get crtc"))
	}

	fn set_crtc(
		&self,
		crtc: CrtcId,
		framebuffer: FramebufferId,
		connector: ConnectorId,
		_state: &CrtcState<FakeMode>,
	) -> Result<(), DisplayError> {
		self.log(Call::SetCrtc {
			crtc,
			framebuffer,
			connector,
		});
		if self.refuse_mode_set {
			return Err(einval("set crtc"));
		}
		Ok(())
	}

	fn wait_for_events(&self, _timeout: Duration) -> Result<Readiness, DisplayError> {
		self.log(Call::Wait);
		// An exhausted script fails so a broken wait loop cannot hang the test run.
		match self.waits.borrow_mut().pop_front().unwrap_or(FakeWait::Fail(Errno::EIO)) {
			FakeWait::Timeout => Ok(Readiness::TimedOut),
			FakeWait::Events(events) => {
				self.pending.borrow_mut().extend(events);
				Ok(Readiness::Readable)
			}
			FakeWait::Fail(errno) => Err(DisplayError::Wait(errno)),
		}
	}

	fn dispatch_events(&self, on_flip: &mut dyn FnMut(FlipEvent)) -> Result<(), DisplayError> {
		self.log(Call::Dispatch);
		for event in self.pending.borrow_mut().drain(..) {
			on_flip(event);
		}
		Ok(())
	}
}
