/*
    Copyright (C) 2025 resarc developers

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU General Public License as published by
    the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU General Public License for more details.

    You should have received a copy of the GNU General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

//! The variable-length resource configuration record.
//!
//! A configuration begins with its own size and then a fixed sequence of
//! fields. Not every file carries every field: readers watch the size
//! thresholds at 28, 32, 36, 48 and 52 bytes and leave anything beyond the
//! declared size at its default. Bytes past the last known field are kept
//! verbatim so the record re-emits byte-exactly.

use std::fmt::{self, Display};

use crate::stream::{Reader, StreamError, StreamResult, Writer};

/// The smallest size in bytes a configuration can declare.
const MIN_SIZE: u32 = 28;

/// The smallest size that carries screen layout / UI mode / smallest-width.
const SCREEN_CONFIG_MIN_SIZE: u32 = 32;

/// The smallest size that carries screen width/height in dp.
const SCREEN_DP_MIN_SIZE: u32 = 36;

/// The smallest size that carries locale script and variant.
const LOCALE_MIN_SIZE: u32 = 48;

/// The smallest size that carries the screen config extension.
const SCREEN_CONFIG_EXTENSION_MIN_SIZE: u32 = 52;

pub const KEYBOARDHIDDEN_MASK: u8 = 0x03;
pub const NAVIGATIONHIDDEN_MASK: u8 = 0x0C;
pub const SCREENLAYOUT_LAYOUTDIR_MASK: u8 = 0xC0;
pub const SCREENLAYOUT_SIZE_MASK: u8 = 0x0F;
pub const SCREENLAYOUT_LONG_MASK: u8 = 0x30;
pub const SCREENLAYOUT_ROUND_MASK: u8 = 0x03;
pub const UI_MODE_TYPE_MASK: u8 = 0x0F;
pub const UI_MODE_NIGHT_MASK: u8 = 0x30;
pub const COLOR_MODE_WIDE_GAMUT_MASK: u8 = 0x03;
pub const COLOR_MODE_HDR_MASK: u8 = 0x0C;

pub const DENSITY_DPI_UNDEFINED: u16 = 0;
pub const DENSITY_DPI_ANY: u16 = 0xFFFE;
pub const DENSITY_DPI_NONE: u16 = 0xFFFF;

/// Describes a particular resource configuration (locale, density,
/// orientation, ...). Compares and hashes structurally so configurations can
/// key maps.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceConfiguration {
    /// The number of bytes this record occupies on disk.
    pub size: u32,
    pub mcc: u16,
    pub mnc: u16,
    /// Packed 2-byte language code; see [`ResourceConfiguration::language`].
    pub language: [u8; 2],
    /// Packed 2-byte region code; see [`ResourceConfiguration::region`].
    pub region: [u8; 2],
    pub orientation: u8,
    pub touchscreen: u8,
    pub density: u16,
    pub keyboard: u8,
    pub navigation: u8,
    pub input_flags: u8,
    pub screen_width: u16,
    pub screen_height: u16,
    pub sdk_version: u16,
    pub minor_version: u16,
    pub screen_layout: u8,
    pub ui_mode: u8,
    pub smallest_screen_width_dp: u16,
    pub screen_width_dp: u16,
    pub screen_height_dp: u16,
    /// ISO-15924 short script name, zero-padded.
    pub locale_script: [u8; 4],
    /// BCP-47 variant subtag, zero-padded.
    pub locale_variant: [u8; 8],
    pub screen_layout_2: u8,
    pub color_mode: u8,
    /// Any trailing bytes this record declared beyond the known fields,
    /// preserved verbatim.
    pub unknown: Vec<u8>,
}

impl Default for ResourceConfiguration {
    fn default() -> Self {
        Self {
            size: SCREEN_CONFIG_EXTENSION_MIN_SIZE,
            mcc: 0,
            mnc: 0,
            language: [0; 2],
            region: [0; 2],
            orientation: 0,
            touchscreen: 0,
            density: 0,
            keyboard: 0,
            navigation: 0,
            input_flags: 0,
            screen_width: 0,
            screen_height: 0,
            sdk_version: 0,
            minor_version: 0,
            screen_layout: 0,
            ui_mode: 0,
            smallest_screen_width_dp: 0,
            screen_width_dp: 0,
            screen_height_dp: 0,
            locale_script: [0; 4],
            locale_variant: [0; 8],
            screen_layout_2: 0,
            color_mode: 0,
            unknown: Vec::new(),
        }
    }
}

impl ResourceConfiguration {
    pub fn parse(r: &mut Reader) -> StreamResult<Self> {
        let start = r.pos();
        let size = r.u32()?;
        if size < MIN_SIZE {
            return Err(StreamError::malformed(
                start,
                format!("configuration size {size} is below the minimum of {MIN_SIZE}"),
            ));
        }

        let mut config = ResourceConfiguration {
            size,
            ..Default::default()
        };
        config.mcc = r.u16()?;
        config.mnc = r.u16()?;
        config.language = [r.u8()?, r.u8()?];
        config.region = [r.u8()?, r.u8()?];
        config.orientation = r.u8()?;
        config.touchscreen = r.u8()?;
        config.density = r.u16()?;
        config.keyboard = r.u8()?;
        config.navigation = r.u8()?;
        config.input_flags = r.u8()?;
        let _pad = r.u8()?;
        config.screen_width = r.u16()?;
        config.screen_height = r.u16()?;
        config.sdk_version = r.u16()?;
        config.minor_version = r.u16()?;

        if size >= SCREEN_CONFIG_MIN_SIZE {
            config.screen_layout = r.u8()?;
            config.ui_mode = r.u8()?;
            config.smallest_screen_width_dp = r.u16()?;
        }
        if size >= SCREEN_DP_MIN_SIZE {
            config.screen_width_dp = r.u16()?;
            config.screen_height_dp = r.u16()?;
        }
        if size >= LOCALE_MIN_SIZE {
            config.locale_script.copy_from_slice(r.bytes(4)?);
            config.locale_variant.copy_from_slice(r.bytes(8)?);
        }
        if size >= SCREEN_CONFIG_EXTENSION_MIN_SIZE {
            config.screen_layout_2 = r.u8()?;
            config.color_mode = r.u8()?;
            let _pad = r.u16()?;
        }

        // Whatever the declared size covers beyond the known fields is
        // carried through untouched.
        let read = r.pos() - start;
        config.unknown = r.bytes((size as u64 - read) as usize)?.to_vec();
        Ok(config)
    }

    /// Emits exactly `self.size` bytes.
    pub fn write(&self, out: &mut Writer) {
        out.u32(self.size);
        out.u16(self.mcc);
        out.u16(self.mnc);
        out.bytes(&self.language);
        out.bytes(&self.region);
        out.u8(self.orientation);
        out.u8(self.touchscreen);
        out.u16(self.density);
        out.u8(self.keyboard);
        out.u8(self.navigation);
        out.u8(self.input_flags);
        out.u8(0);
        out.u16(self.screen_width);
        out.u16(self.screen_height);
        out.u16(self.sdk_version);
        out.u16(self.minor_version);

        if self.size >= SCREEN_CONFIG_MIN_SIZE {
            out.u8(self.screen_layout);
            out.u8(self.ui_mode);
            out.u16(self.smallest_screen_width_dp);
        }
        if self.size >= SCREEN_DP_MIN_SIZE {
            out.u16(self.screen_width_dp);
            out.u16(self.screen_height_dp);
        }
        if self.size >= LOCALE_MIN_SIZE {
            out.bytes(&self.locale_script);
            out.bytes(&self.locale_variant);
        }
        if self.size >= SCREEN_CONFIG_EXTENSION_MIN_SIZE {
            out.u8(self.screen_layout_2);
            out.u8(self.color_mode);
            out.u16(0);
        }

        out.bytes(&self.unknown);
    }

    /// True if every known field is zero and the unknown tail is all zeros.
    /// This is the "any" configuration that baseless-key analysis matches.
    pub fn is_default(&self) -> bool {
        let zeroed = ResourceConfiguration {
            size: self.size,
            unknown: self.unknown.clone(),
            ..Default::default()
        };
        *self == zeroed && self.unknown.iter().all(|&b| b == 0)
    }

    /// The language as an unpacked string; empty if unset.
    pub fn language(&self) -> String {
        unpack_language_or_region(self.language, 0x61)
    }

    /// The region as an unpacked string; empty if unset.
    pub fn region(&self) -> String {
        unpack_language_or_region(self.region, 0x30)
    }

    /// The locale script as a string, stopping at the first zero byte.
    pub fn locale_script(&self) -> String {
        zero_terminated(&self.locale_script)
    }

    /// The locale variant as a string, stopping at the first zero byte.
    pub fn locale_variant(&self) -> String {
        zero_terminated(&self.locale_variant)
    }

    pub fn keyboard_hidden(&self) -> u8 {
        self.input_flags & KEYBOARDHIDDEN_MASK
    }

    pub fn navigation_hidden(&self) -> u8 {
        self.input_flags & NAVIGATIONHIDDEN_MASK
    }

    pub fn screen_layout_direction(&self) -> u8 {
        self.screen_layout & SCREENLAYOUT_LAYOUTDIR_MASK
    }

    pub fn screen_layout_size(&self) -> u8 {
        self.screen_layout & SCREENLAYOUT_SIZE_MASK
    }

    pub fn screen_layout_long(&self) -> u8 {
        self.screen_layout & SCREENLAYOUT_LONG_MASK
    }

    pub fn screen_layout_round(&self) -> u8 {
        self.screen_layout_2 & SCREENLAYOUT_ROUND_MASK
    }

    pub fn ui_mode_type(&self) -> u8 {
        self.ui_mode & UI_MODE_TYPE_MASK
    }

    pub fn ui_mode_night(&self) -> u8 {
        self.ui_mode & UI_MODE_NIGHT_MASK
    }

    pub fn color_mode_wide_gamut(&self) -> u8 {
        self.color_mode & COLOR_MODE_WIDE_GAMUT_MASK
    }

    pub fn color_mode_hdr(&self) -> u8 {
        self.color_mode & COLOR_MODE_HDR_MASK
    }

    pub fn is_density_compatible_with(&self, device_density_dpi: u16) -> bool {
        match self.density {
            DENSITY_DPI_UNDEFINED | DENSITY_DPI_ANY | DENSITY_DPI_NONE => true,
            density => density <= device_density_dpi,
        }
    }

    /// The configuration's qualifier parts in resource-directory order,
    /// e.g. `["en-rUS", "hdpi", "v26"]`. Empty for the default
    /// configuration.
    pub fn qualifiers(&self) -> Vec<String> {
        let mut parts = Vec::new();
        if self.mcc != 0 {
            parts.push(format!("mcc{}", self.mcc));
        }
        if self.mnc != 0 {
            parts.push(format!("mnc{}", self.mnc));
        }
        push_locale(self, &mut parts);
        push_named(&mut parts, layout_direction_name(self.screen_layout_direction()));
        if self.smallest_screen_width_dp != 0 {
            parts.push(format!("sw{}dp", self.smallest_screen_width_dp));
        }
        if self.screen_width_dp != 0 {
            parts.push(format!("w{}dp", self.screen_width_dp));
        }
        if self.screen_height_dp != 0 {
            parts.push(format!("h{}dp", self.screen_height_dp));
        }
        push_named(&mut parts, layout_size_name(self.screen_layout_size()));
        push_named(&mut parts, layout_long_name(self.screen_layout_long()));
        push_named(&mut parts, layout_round_name(self.screen_layout_round()));
        push_named(&mut parts, color_hdr_name(self.color_mode_hdr()));
        push_named(&mut parts, color_gamut_name(self.color_mode_wide_gamut()));
        push_named(&mut parts, orientation_name(self.orientation));
        push_named(&mut parts, ui_mode_type_name(self.ui_mode_type()));
        push_named(&mut parts, ui_mode_night_name(self.ui_mode_night()));
        match density_name(self.density) {
            Some("") => {}
            Some(name) => parts.push(name.to_string()),
            None => parts.push(format!("{}dpi", self.density)),
        }
        push_named(&mut parts, touchscreen_name(self.touchscreen));
        push_named(&mut parts, keyboard_hidden_name(self.keyboard_hidden()));
        push_named(&mut parts, keyboard_name(self.keyboard));
        push_named(&mut parts, navigation_hidden_name(self.navigation_hidden()));
        push_named(&mut parts, navigation_name(self.navigation));
        if self.screen_width != 0 || self.screen_height != 0 {
            parts.push(format!("{}x{}", self.screen_width, self.screen_height));
        }
        if self.sdk_version != 0 {
            if self.minor_version != 0 {
                parts.push(format!("v{}.{}", self.sdk_version, self.minor_version));
            } else {
                parts.push(format!("v{}", self.sdk_version));
            }
        }
        parts
    }
}

/// Prevents the default configuration from rendering as the empty string.
impl Display for ResourceConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            return write!(f, "default");
        }
        write!(f, "{}", self.qualifiers().join("-"))
    }
}

fn push_named(parts: &mut Vec<String>, name: Option<impl Into<String>>) {
    if let Some(name) = name {
        parts.push(name.into());
    }
}

/// Renders the locale qualifier. A configuration carrying a script or
/// variant uses the modified BCP 47 form `b+language+script+region+variant`;
/// otherwise language and region appear as `language` and `rREGION` parts.
fn push_locale(config: &ResourceConfiguration, parts: &mut Vec<String>) {
    let language = config.language();
    let region = config.region();
    let script = config.locale_script();
    let variant = config.locale_variant();
    if script.is_empty() && variant.is_empty() {
        if !language.is_empty() {
            parts.push(language);
        }
        if !region.is_empty() {
            parts.push(format!("r{region}"));
        }
        return;
    }
    let mut locale = format!("b+{language}");
    if !script.is_empty() {
        locale.push_str(&format!("+{script}"));
    }
    if !region.is_empty() {
        locale.push_str(&format!("+{region}"));
    }
    if !variant.is_empty() {
        locale.push_str(&format!("+{variant}"));
    }
    parts.push(locale);
}

fn layout_direction_name(value: u8) -> Option<&'static str> {
    match value {
        0x40 => Some("ldltr"),
        0x80 => Some("ldrtl"),
        _ => None,
    }
}

fn layout_size_name(value: u8) -> Option<&'static str> {
    match value {
        0x01 => Some("small"),
        0x02 => Some("normal"),
        0x03 => Some("large"),
        0x04 => Some("xlarge"),
        _ => None,
    }
}

fn layout_long_name(value: u8) -> Option<&'static str> {
    match value {
        0x10 => Some("notlong"),
        0x20 => Some("long"),
        _ => None,
    }
}

fn layout_round_name(value: u8) -> Option<&'static str> {
    match value {
        0x01 => Some("notround"),
        0x02 => Some("round"),
        _ => None,
    }
}

fn color_hdr_name(value: u8) -> Option<&'static str> {
    match value {
        0x04 => Some("lowdr"),
        0x08 => Some("highdr"),
        _ => None,
    }
}

fn color_gamut_name(value: u8) -> Option<&'static str> {
    match value {
        0x01 => Some("nowidecg"),
        0x02 => Some("widecg"),
        _ => None,
    }
}

fn orientation_name(value: u8) -> Option<&'static str> {
    match value {
        0x01 => Some("port"),
        0x02 => Some("land"),
        _ => None,
    }
}

fn ui_mode_type_name(value: u8) -> Option<&'static str> {
    match value {
        0x02 => Some("desk"),
        0x03 => Some("car"),
        0x04 => Some("television"),
        0x05 => Some("appliance"),
        0x06 => Some("watch"),
        0x07 => Some("vrheadset"),
        _ => None,
    }
}

fn ui_mode_night_name(value: u8) -> Option<&'static str> {
    match value {
        0x10 => Some("notnight"),
        0x20 => Some("night"),
        _ => None,
    }
}

fn density_name(value: u16) -> Option<&'static str> {
    match value {
        DENSITY_DPI_UNDEFINED => Some(""),
        120 => Some("ldpi"),
        160 => Some("mdpi"),
        213 => Some("tvdpi"),
        240 => Some("hdpi"),
        320 => Some("xhdpi"),
        480 => Some("xxhdpi"),
        640 => Some("xxxhdpi"),
        DENSITY_DPI_ANY => Some("anydpi"),
        DENSITY_DPI_NONE => Some("nodpi"),
        _ => None,
    }
}

fn touchscreen_name(value: u8) -> Option<&'static str> {
    match value {
        1 => Some("notouch"),
        3 => Some("finger"),
        _ => None,
    }
}

fn keyboard_hidden_name(value: u8) -> Option<&'static str> {
    match value {
        1 => Some("keysexposed"),
        2 => Some("keyshidden"),
        3 => Some("keyssoft"),
        _ => None,
    }
}

fn keyboard_name(value: u8) -> Option<&'static str> {
    match value {
        1 => Some("nokeys"),
        2 => Some("qwerty"),
        3 => Some("12key"),
        _ => None,
    }
}

fn navigation_hidden_name(value: u8) -> Option<&'static str> {
    match value {
        0x04 => Some("navexposed"),
        0x08 => Some("navhidden"),
        _ => None,
    }
}

fn navigation_name(value: u8) -> Option<&'static str> {
    match value {
        1 => Some("nonav"),
        2 => Some("dpad"),
        3 => Some("trackball"),
        4 => Some("wheel"),
        _ => None,
    }
}

/// Packs a 2- or 3-letter lowercase language code into the 2-byte on-disk
/// form. Three-letter codes use the compressed layout with the high bit of
/// the first byte set and each letter stored as a 5-bit offset from 'a'.
pub fn pack_language(language: &str) -> StreamResult<[u8; 2]> {
    pack_language_or_region(language, 0x61, "language")
}

/// Packs a 2- or 3-character region code; 3-character regions are digits
/// offset from '0'.
pub fn pack_region(region: &str) -> StreamResult<[u8; 2]> {
    pack_language_or_region(region, 0x30, "region")
}

fn pack_language_or_region(value: &str, base: u8, what: &str) -> StreamResult<[u8; 2]> {
    let bytes = value.as_bytes();
    match bytes.len() {
        0 => Ok([0, 0]),
        2 => Ok([bytes[0], bytes[1]]),
        3 => {
            for &b in bytes {
                if b < base || b >= base + 26 {
                    return Err(StreamError::invariant(format!(
                        "{what} {value:?} cannot be packed"
                    )));
                }
            }
            let (a, b, c) = (bytes[0] - base, bytes[1] - base, bytes[2] - base);
            Ok([(c << 2) | (b >> 3) | 0x80, a | (b << 5)])
        }
        _ => Err(StreamError::invariant(format!(
            "{what} {value:?} must be 2 or 3 characters"
        ))),
    }
}

fn unpack_language_or_region(value: [u8; 2], base: u8) -> String {
    if value == [0, 0] {
        return String::new();
    }
    if value[0] & 0x80 != 0 {
        let bytes = [
            base + (value[1] & 0x1F),
            base + ((value[1] & 0xE0) >> 5) + ((value[0] & 0x03) << 3),
            base + ((value[0] & 0x7C) >> 2),
        ];
        return String::from_utf8_lossy(&bytes).into_owned();
    }
    String::from_utf8_lossy(&value).into_owned()
}

fn zero_terminated(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}
