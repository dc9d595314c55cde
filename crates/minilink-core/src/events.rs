//! Binary event-table decoders
//!
//! Once status push is enabled, the miniserver streams device-state
//! updates as binary "event tables", one table per frame, announced by
//! the preceding message header. Four layouts exist:
//!
//! ```text
//! value states    N × (uuid:16 | f64 value:8)                        = 24
//! text states     N × (uuid:16 | icon uuid:16 | u32 len:4 | text:len
//!                      | pad to 4-byte boundary)
//! daytimer states uuid:16 | f64 default:8 | u32 count:4
//!                 then count × (u32 mode | u32 from | u32 to
//!                      | u32 needActivate | f64 value)               = 24
//! weather states  uuid:16 | u32 lastUpdate:4 | u32 count:4
//!                 then count × (5 × u32 | 6 × f64)                   = 68
//! ```
//!
//! All integers and doubles are little-endian. Decoders are pure: they
//! return an ordered sequence of updates and never touch the registry —
//! applying updates is the session's job.
//!
//! The daytimer and weather loops are deliberately permissive: the
//! declared entry count bounds iteration, surplus bytes are ignored, and
//! a buffer holding fewer entries than declared stops the loop early
//! without error.

use bytes::Buf;

use crate::error::{Error, Result};
use crate::uuid::Uuid;

/// Size of one value-state record.
pub const VALUE_RECORD_SIZE: usize = 24;

/// Fixed portion of a text-state record (uuid + icon uuid + length).
pub const TEXT_RECORD_MIN: usize = 36;

/// Fixed portion of a daytimer table (uuid + default + count).
pub const DAYTIMER_HEADER_SIZE: usize = 28;

/// Size of one daytimer entry.
pub const DAYTIMER_ENTRY_SIZE: usize = 24;

/// Fixed portion of a weather table (uuid + lastUpdate + count).
pub const WEATHER_HEADER_SIZE: usize = 24;

/// Size of one weather entry.
pub const WEATHER_ENTRY_SIZE: usize = 68;

/// A single numeric state update.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueEvent {
    pub uuid: Uuid,
    pub value: f64,
}

/// A single textual state update.
///
/// The icon identifier is carried on the wire but not applied to device
/// values; it is surfaced for presentation layers.
#[derive(Debug, Clone, PartialEq)]
pub struct TextEvent {
    pub uuid: Uuid,
    pub icon: Uuid,
    pub text: String,
}

/// One schedule slot of a daytimer table.
#[derive(Debug, Clone, PartialEq)]
pub struct DaytimerEntry {
    pub mode: u32,
    pub from: u32,
    pub to: u32,
    pub need_activate: bool,
    pub value: f64,
}

/// A daytimer state update: default value plus schedule entries.
#[derive(Debug, Clone, PartialEq)]
pub struct DaytimerEvent {
    pub uuid: Uuid,
    pub default_value: f64,
    pub entries: Vec<DaytimerEntry>,
}

/// One forecast slot of a weather table.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherEntry {
    pub timestamp: u32,
    pub weather_type: u32,
    pub wind_direction: u32,
    pub solar_radiation: u32,
    pub relative_humidity: u32,
    pub temperature: f64,
    pub perceived_temperature: f64,
    pub dew_point: f64,
    pub precipitation: f64,
    pub wind_speed: f64,
    pub barometric_pressure: f64,
}

/// A weather state update: observation time plus forecast entries.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherEvent {
    pub uuid: Uuid,
    pub last_update: u32,
    pub entries: Vec<WeatherEntry>,
}

/// Decode an event table of value states.
///
/// The table is a whole number of fixed 24-byte records; anything else
/// fails with [`Error::MalformedTable`] and the entire frame is discarded
/// (no partial application).
pub fn decode_value_states(table: &[u8]) -> Result<Vec<ValueEvent>> {
    if table.len() % VALUE_RECORD_SIZE != 0 {
        return Err(Error::MalformedTable(format!(
            "value table length {} is not a multiple of {}",
            table.len(),
            VALUE_RECORD_SIZE
        )));
    }
    let mut buf = table;
    let mut events = Vec::with_capacity(table.len() / VALUE_RECORD_SIZE);
    while buf.has_remaining() {
        let uuid = Uuid::read(&mut buf)?;
        let value = buf.get_f64_le();
        events.push(ValueEvent { uuid, value });
    }
    Ok(events)
}

/// Decode an event table of text states.
///
/// Records are variable length and consumed from a running offset. Each
/// text field is padded so the next record starts on a 4-byte boundary
/// relative to the text start. An empty table decodes to zero updates;
/// truncation anywhere inside a record fails with
/// [`Error::MalformedTable`].
pub fn decode_text_states(table: &[u8]) -> Result<Vec<TextEvent>> {
    let mut buf = table;
    let mut events = Vec::new();
    while buf.has_remaining() {
        if buf.remaining() < TEXT_RECORD_MIN {
            return Err(Error::MalformedTable(format!(
                "text record truncated: {} bytes left, need at least {}",
                buf.remaining(),
                TEXT_RECORD_MIN
            )));
        }
        let uuid = Uuid::read(&mut buf)?;
        let icon = Uuid::read(&mut buf)?;
        let len = buf.get_u32_le() as usize;
        let padding = (4 - len % 4) % 4;
        if buf.remaining() < len + padding {
            return Err(Error::MalformedTable(format!(
                "text record truncated: {} bytes left, need {}",
                buf.remaining(),
                len + padding
            )));
        }
        let text = String::from_utf8_lossy(&buf[..len]).into_owned();
        buf.advance(len + padding);
        events.push(TextEvent { uuid, icon, text });
    }
    Ok(events)
}

/// Decode an event table of daytimer states.
///
/// The declared entry count bounds the loop; a shorter buffer stops
/// early, surplus bytes are ignored.
pub fn decode_daytimer_states(table: &[u8]) -> Result<DaytimerEvent> {
    if table.len() < DAYTIMER_HEADER_SIZE {
        return Err(Error::BufferUnderrun {
            needed: DAYTIMER_HEADER_SIZE,
            have: table.len(),
        });
    }
    let mut buf = table;
    let uuid = Uuid::read(&mut buf)?;
    let default_value = buf.get_f64_le();
    let count = buf.get_u32_le() as usize;

    let mut entries = Vec::with_capacity(count.min(buf.remaining() / DAYTIMER_ENTRY_SIZE));
    while entries.len() < count && buf.remaining() >= DAYTIMER_ENTRY_SIZE {
        entries.push(DaytimerEntry {
            mode: buf.get_u32_le(),
            from: buf.get_u32_le(),
            to: buf.get_u32_le(),
            need_activate: buf.get_u32_le() != 0,
            value: buf.get_f64_le(),
        });
    }
    Ok(DaytimerEvent {
        uuid,
        default_value,
        entries,
    })
}

/// Decode an event table of weather states.
///
/// Same permissive entry loop as the daytimer table.
pub fn decode_weather_states(table: &[u8]) -> Result<WeatherEvent> {
    if table.len() < WEATHER_HEADER_SIZE {
        return Err(Error::BufferUnderrun {
            needed: WEATHER_HEADER_SIZE,
            have: table.len(),
        });
    }
    let mut buf = table;
    let uuid = Uuid::read(&mut buf)?;
    let last_update = buf.get_u32_le();
    let count = buf.get_u32_le() as usize;

    let mut entries = Vec::with_capacity(count.min(buf.remaining() / WEATHER_ENTRY_SIZE));
    while entries.len() < count && buf.remaining() >= WEATHER_ENTRY_SIZE {
        entries.push(WeatherEntry {
            timestamp: buf.get_u32_le(),
            weather_type: buf.get_u32_le(),
            wind_direction: buf.get_u32_le(),
            solar_radiation: buf.get_u32_le(),
            relative_humidity: buf.get_u32_le(),
            temperature: buf.get_f64_le(),
            perceived_temperature: buf.get_f64_le(),
            dew_point: buf.get_f64_le(),
            precipitation: buf.get_f64_le(),
            wind_speed: buf.get_f64_le(),
            barometric_pressure: buf.get_f64_le(),
        });
    }
    Ok(WeatherEvent {
        uuid,
        last_update,
        entries,
    })
}
