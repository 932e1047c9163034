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

use resarc::config::{pack_language, pack_region, ResourceConfiguration, DENSITY_DPI_ANY};
use resarc::stream::{Reader, Writer};

fn round_trip(config: &ResourceConfiguration) -> ResourceConfiguration {
    let mut out = Writer::new();
    config.write(&mut out);
    let bytes = out.into_bytes();
    assert_eq!(bytes.len(), config.size as usize);
    ResourceConfiguration::parse(&mut Reader::new(&bytes)).unwrap()
}

#[test]
fn default_configuration_round_trips() {
    let config = ResourceConfiguration::default();
    assert_eq!(round_trip(&config), config);
    assert!(config.is_default());
}

#[test]
fn populated_configuration_round_trips() {
    let config = ResourceConfiguration {
        mcc: 310,
        mnc: 4,
        language: pack_language("en").unwrap(),
        region: pack_region("US").unwrap(),
        orientation: 1,
        density: 480,
        sdk_version: 26,
        screen_layout: 0x40,
        smallest_screen_width_dp: 320,
        screen_width_dp: 411,
        screen_height_dp: 731,
        ..Default::default()
    };
    let parsed = round_trip(&config);
    assert_eq!(parsed, config);
    assert!(!parsed.is_default());
    assert_eq!(parsed.language(), "en");
    assert_eq!(parsed.region(), "US");
}

#[test]
fn trailing_unknown_bytes_are_preserved() {
    let config = ResourceConfiguration {
        size: 56,
        unknown: vec![0xDE, 0xAD, 0xBE, 0xEF],
        ..Default::default()
    };
    let parsed = round_trip(&config);
    assert_eq!(parsed.unknown, vec![0xDE, 0xAD, 0xBE, 0xEF]);
    assert_eq!(parsed, config);
    // Non-zero unknown bytes disqualify the default configuration.
    assert!(!parsed.is_default());
}

#[test]
fn short_legacy_configuration_parses() {
    // A 28-byte record stops after minor version; later fields default.
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&28u32.to_le_bytes());
    bytes.extend_from_slice(&[0u8; 12]); // mcc, mnc, language, region, orientation..density
    bytes.extend_from_slice(&[0u8; 4]); // keyboard, navigation, input flags, padding
    bytes.extend_from_slice(&320u16.to_le_bytes()); // screen width
    bytes.extend_from_slice(&480u16.to_le_bytes()); // screen height
    bytes.extend_from_slice(&9u16.to_le_bytes()); // sdk version
    bytes.extend_from_slice(&0u16.to_le_bytes()); // minor version

    let parsed = ResourceConfiguration::parse(&mut Reader::new(&bytes)).unwrap();
    assert_eq!(parsed.size, 28);
    assert_eq!(parsed.screen_width, 320);
    assert_eq!(parsed.screen_height, 480);
    assert_eq!(parsed.sdk_version, 9);
    assert_eq!(parsed.screen_layout, 0);
    assert!(parsed.unknown.is_empty());
    assert_eq!(round_trip(&parsed), parsed);
}

#[test]
fn undersized_configuration_is_rejected() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&20u32.to_le_bytes());
    bytes.extend_from_slice(&[0u8; 16]);
    assert!(ResourceConfiguration::parse(&mut Reader::new(&bytes)).is_err());
}

#[test]
fn three_letter_language_packs_compressed() {
    let packed = pack_language("fil").unwrap();
    assert_ne!(packed[0] & 0x80, 0);
    let config = ResourceConfiguration {
        language: packed,
        ..Default::default()
    };
    assert_eq!(config.language(), "fil");
}

#[test]
fn two_letter_language_packs_verbatim() {
    assert_eq!(pack_language("de").unwrap(), [b'd', b'e']);
    assert_eq!(pack_language("").unwrap(), [0, 0]);
    assert!(pack_language("toolong").is_err());
}

#[test]
fn density_compatibility() {
    let mut config = ResourceConfiguration::default();
    assert!(config.is_density_compatible_with(160));
    config.density = DENSITY_DPI_ANY;
    assert!(config.is_density_compatible_with(160));
    config.density = 480;
    assert!(!config.is_density_compatible_with(160));
    assert!(config.is_density_compatible_with(480));
}

#[test]
fn qualifiers_render_in_directory_order() {
    let config = ResourceConfiguration {
        language: pack_language("en").unwrap(),
        region: pack_region("US").unwrap(),
        density: 240,
        orientation: 2,
        sdk_version: 26,
        ..Default::default()
    };
    assert_eq!(config.to_string(), "en-rUS-land-hdpi-v26");

    let mut with_minor = config.clone();
    with_minor.minor_version = 1;
    assert!(with_minor.to_string().ends_with("v26.1"));

    assert_eq!(ResourceConfiguration::default().to_string(), "default");
}

#[test]
fn qualifiers_merge_locale_with_script() {
    let config = ResourceConfiguration {
        language: pack_language("sr").unwrap(),
        region: pack_region("RS").unwrap(),
        locale_script: *b"Latn",
        ..Default::default()
    };
    assert_eq!(config.to_string(), "b+sr+Latn+RS");
}

#[test]
fn unmapped_density_renders_numerically() {
    let config = ResourceConfiguration {
        density: 300,
        ..Default::default()
    };
    assert_eq!(config.to_string(), "300dpi");
}

#[test]
fn masked_accessors_select_their_bits() {
    let config = ResourceConfiguration {
        input_flags: 0x05, // keys exposed, nav exposed
        screen_layout: 0x64,
        ui_mode: 0x21,
        color_mode: 0x06,
        ..Default::default()
    };
    assert_eq!(config.keyboard_hidden(), 0x01);
    assert_eq!(config.navigation_hidden(), 0x04);
    assert_eq!(config.screen_layout_direction(), 0x40);
    assert_eq!(config.screen_layout_long(), 0x20);
    assert_eq!(config.screen_layout_size(), 0x04);
    assert_eq!(config.ui_mode_type(), 0x01);
    assert_eq!(config.ui_mode_night(), 0x20);
    assert_eq!(config.color_mode_wide_gamut(), 0x02);
    assert_eq!(config.color_mode_hdr(), 0x04);
}
