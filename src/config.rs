//! Timing and size constants shared by the transport, workflows and
//! emulation loop.
//!
//! Bundled into one module rather than inlined at each call site, following
//! `dfu/config.rs` in the teacher crate.

use std::time::Duration;

/// Serial baud rate for the PN532 in HSU mode.
pub const BAUD_RATE: u32 = 115_200;

/// How long DTR is asserted during [`crate::transport::Transport::open`]'s
/// reset pulse.
pub const OPEN_RESET_ASSERT: Duration = Duration::from_millis(100);

/// How long to wait after releasing DTR during `open`, before flushing.
pub const OPEN_RESET_SETTLE: Duration = Duration::from_millis(1500);

/// DTR assert duration for [`crate::transport::Transport::hard_reset`].
pub const HARD_RESET_ASSERT: Duration = Duration::from_millis(500);

/// Settle time after `hard_reset`'s DTR pulse.
pub const HARD_RESET_SETTLE: Duration = Duration::from_secs(3);

/// Sleep after writing the HSU wake-up preamble, before flushing input.
pub const WAKE_SLEEP: Duration = Duration::from_millis(200);

/// Delay before every `InDataExchange`, giving an emulated peer time to loop
/// back from `TgSetData` to `TgGetData`.
pub const APDU_INTERFRAME_DELAY: Duration = Duration::from_millis(20);

/// Retry delay used by the ISO-DEP leak workaround's single retry.
pub const APDU_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Deadline for a single `InDataExchange` round trip.
pub const APDU_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(2);

/// Deadline for `TgInitAsTarget`, `TgGetData` and `TgSetData` in the
/// emulation loop.
pub const TARGET_COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// Consecutive `TgGetData` timeouts tolerated before the emulation loop
/// assumes the reader is gone and re-arms.
pub const TGGET_MAX_CONSECUTIVE_TIMEOUTS: u32 = 3;

/// Soft retries (flush + short delay) attempted before escalating to a hard
/// reset in [`crate::commands::sam_configuration_with_recovery`].
pub const SOFT_RETRY_COUNT: u32 = 3;

/// Delay between soft retries.
pub const SOFT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Default deadline for most command/response round trips (firmware
/// version, RF configuration, release, power down).
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(1);

/// Deadline for `InListPassiveTarget`, which waits out the PN532's internal
/// activation retry budget.
pub const LIST_PASSIVE_TARGET_TIMEOUT: Duration = Duration::from_secs(3);

/// Size of the Vault flat byte-addressable buffer.
pub const VAULT_BUFFER_SIZE: usize = 256;

/// NDEF body read chunk size, matching the default `MLe` advertised in the
/// Capability Container.
pub const NDEF_READ_CHUNK: usize = 59;

/// NDEF body write chunk size ceiling; the effective chunk is
/// `min(MLc, NDEF_WRITE_CHUNK)`.
pub const NDEF_WRITE_CHUNK: usize = 52;

/// Bound on the shared log ring buffer, matching the original Python
/// emulation harness's `collections.deque(maxlen=500)`.
pub const LOG_RING_CAPACITY: usize = 500;

/// Largest NDEF message the Type 4 Tag emulator's CC file will advertise
/// room for (the `maxSize` field of the NDEF-TLV).
pub const NDEF_MAX_MESSAGE_SIZE: usize = 2048;

/// Standard NFC Forum Type 4 NDEF application identifier.
pub const TYPE4_NDEF_AID: [u8; 7] = [0xD2, 0x76, 0x00, 0x00, 0x85, 0x01, 0x01];

/// Proprietary Vault application identifier.
pub const VAULT_AID: [u8; 6] = [0xF0, 0x01, 0x02, 0x03, 0x04, 0x05];

/// Capability Container file id.
pub const CC_FILE_ID: u16 = 0xE103;

/// NDEF file id.
pub const NDEF_FILE_ID: u16 = 0xE104;
