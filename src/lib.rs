//! Step sequencer and sample-triggering engine behind the `beatpad` terminal
//! drum machine.
//!
//! The pieces, bottom up:
//!
//! - [`pad`], [`kit`]: what can be played, and the JSON kit files that list it.
//! - [`sample`], [`drums`]: decoded audio and synthesised placeholders.
//! - [`mixer`], [`audio`], [`provider`]: getting buffers to a speaker.
//! - [`pattern`], [`sequencer`]: the grid and the transport.
//! - [`clock`], [`coordinator`], [`session`]: firing steps on time.
//! - [`render`]: the same pipeline against a virtual clock, into a WAV file.

pub mod audio;
pub mod clock;
pub mod coordinator;
pub mod drums;
pub mod kit;
pub mod mixer;
pub mod pad;
pub mod pattern;
pub mod provider;
pub mod render;
pub mod sample;
pub mod sequencer;
pub mod session;

pub use coordinator::{Coordinator, Poll, TriggerEvent, TriggerSink};
pub use kit::Kit;
pub use pad::{Pad, PadCategory, PadId, SourceRef};
pub use pattern::{Pattern, PlayState, TransportState};
pub use provider::{AudioStatus, SampleProvider};
pub use sequencer::{EditError, Snapshot, StepSequencer};
pub use session::Session;
