//! Fatal emulation conditions.
//!
//! Nothing in here is a recoverable runtime fault. Every variant is guest behavior that has not been reverse-engineered
//! or a hardware corner case that was never observed; the host is expected to stop emulation once one of these reaches
//! it. Tolerated quirks (such as the skipped circular DMA descriptor) never produce an error.

use miette::Diagnostic;
use thiserror::Error;

/// All conditions under which the device model refuses to continue.
#[derive(Error, Debug, Diagnostic, Clone, Eq, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub enum ApuError {
	#[error("Scatter-gather entry {entry} for linear address {linear_address:#x} is past the last entry {max_entries}")]
	#[diagnostic(
		code(mcpx::sge_out_of_range),
		severity(Error),
		help("The guest programmed a transfer beyond the page table; check the MAXSGE register of this table")
	)]
	SgeOutOfRange { entry: u32, max_entries: u32, linear_address: u32 },

	#[error("Voice handle {handle:#06x} does not refer to a voice")]
	#[diagnostic(code(mcpx::invalid_voice_handle), severity(Error))]
	InvalidVoiceHandle { handle: u32 },

	#[error("Voice {handle:#06x} has unknown envelope state {state:#x}")]
	#[diagnostic(
		code(mcpx::unknown_envelope_state),
		severity(Error),
		help("The voice record is most likely corrupted")
	)]
	UnknownEnvelopeState { handle: u16, state: u32 },

	#[error("Voice {handle:#06x} entered the force-release envelope state")]
	#[diagnostic(
		code(mcpx::force_release_envelope),
		severity(Error),
		help("The force-release envelope curve is not known yet")
	)]
	ForceReleaseEnvelope { handle: u16 },

	#[error("Voice {handle:#06x} uses an unsupported sample format: {reason}")]
	#[diagnostic(code(mcpx::unsupported_sample_format), severity(Error))]
	UnsupportedSampleFormat { handle: u16, reason: &'static str },

	#[error("Voice {handle:#06x} is a stream voice")]
	#[diagnostic(code(mcpx::stream_voice), severity(Error), help("Stream voices are fed by the front end and not implemented"))]
	StreamVoice { handle: u16 },

	#[error("Unknown DSP DMA item format {format:#x}")]
	#[diagnostic(code(mcpx::unknown_dma_format), severity(Error))]
	UnknownDmaFormat { format: u32 },

	#[error("DSP DMA control action {action:#x} is not supported")]
	#[diagnostic(
		code(mcpx::dma_abort),
		severity(Error),
		help("Aborting a running DMA chain has not been observed on hardware yet")
	)]
	DmaAbort { action: u32 },

	#[error("DSP DMA address {address:#06x} does not map to any DSP memory")]
	#[diagnostic(code(mcpx::unmapped_dsp_address), severity(Error))]
	UnmappedDspAddress { address: u32 },

	#[error("Unknown front-end method {method:#06x} (argument {argument:#010x})")]
	#[diagnostic(code(mcpx::unknown_front_end_method), severity(Error))]
	UnknownFrontEndMethod { method: u32, argument: u32 },
}
