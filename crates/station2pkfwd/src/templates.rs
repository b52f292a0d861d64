// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sample configuration files written by `gen-config`.

use crate::config::Region;

/// Region table with one EU863 and one US902 entry.
pub const REGIONS_YAML: &str = r#"# Region id -> channel plan
1000:
  name: EU863
  config:
    DRs:
      - [12, 125, 0]
      - [11, 125, 0]
      - [10, 125, 0]
      - [9, 125, 0]
      - [8, 125, 0]
      - [7, 125, 0]
      - [7, 250, 0]
      - [0, 0, 0]
      - [-1, 0, 0]
      - [-1, 0, 0]
      - [-1, 0, 0]
      - [-1, 0, 0]
      - [-1, 0, 0]
      - [-1, 0, 0]
      - [-1, 0, 0]
      - [-1, 0, 0]
    upchannels:
      - [868100000, 0, 5]
      - [868300000, 0, 5]
      - [868500000, 0, 5]
      - [867100000, 0, 5]
      - [867300000, 0, 5]
      - [867500000, 0, 5]
      - [867700000, 0, 5]
      - [867900000, 0, 5]
1001:
  name: US902
  config:
    DRs:
      - [10, 125, 0]
      - [9, 125, 0]
      - [8, 125, 0]
      - [7, 125, 0]
      - [8, 500, 0]
      - [-1, 0, 0]
      - [-1, 0, 0]
      - [-1, 0, 0]
      - [12, 500, 1]
      - [11, 500, 1]
      - [10, 500, 1]
      - [9, 500, 1]
      - [8, 500, 1]
      - [7, 500, 1]
      - [-1, 0, 0]
      - [-1, 0, 0]
    upchannels:
      - [902300000, 0, 3]
      - [902500000, 0, 3]
      - [902700000, 0, 3]
      - [902900000, 0, 3]
      - [903100000, 0, 3]
      - [903300000, 0, 3]
      - [903500000, 0, 3]
      - [903700000, 0, 3]
      - [903000000, 4, 4]
"#;

/// Station on an 8-channel EU863 concentrator.
pub const EU863_ROUTER_YAML: &str = r#"station:
  JoinEui: null
  NetID: null
  bcning: null
  config: {}
  freq_range: [863000000, 870000000]
  hwspec: sx1301/1
  max_eirp: 16
  protocol: 1
  region: EU863
  regionid: 1000
  sx1301_conf:
    - chan_FSK: {enable: false}
      chan_Lora_std: {enable: false}
      chan_multiSF_0: {enable: true, if: -375000, radio: 0}
      chan_multiSF_1: {enable: true, if: -175000, radio: 0}
      chan_multiSF_2: {enable: true, if: 25000, radio: 0}
      chan_multiSF_3: {enable: true, if: 375000, radio: 0}
      chan_multiSF_4: {enable: true, if: -237500, radio: 1}
      chan_multiSF_5: {enable: true, if: 237500, radio: 1}
      chan_multiSF_6: {enable: false}
      chan_multiSF_7: {enable: false}
      radio_0: {enable: true, freq: 868475000}
      radio_1: {enable: true, freq: 869287500}
pktfwd: {}
"#;

/// Station on the first US902 sub-band.
pub const US902_ROUTER_YAML: &str = r#"station:
  JoinEui: null
  NetID: null
  bcning: null
  config: {}
  freq_range: [902000000, 928000000]
  hwspec: sx1301/1
  max_eirp: 30.0
  protocol: 1
  region: US902
  regionid: 1001
  sx1301_conf:
    - chan_FSK: {enable: false}
      chan_Lora_std: {bandwidth: 500000, enable: true, if: 300000, radio: 0, spread_factor: 8}
      chan_multiSF_0: {enable: true, if: -400000, radio: 0}
      chan_multiSF_1: {enable: true, if: -200000, radio: 0}
      chan_multiSF_2: {enable: true, if: 0, radio: 0}
      chan_multiSF_3: {enable: true, if: 200000, radio: 0}
      chan_multiSF_4: {enable: true, if: 400000, radio: 0}
      chan_multiSF_5: {enable: true, if: -200000, radio: 1}
      chan_multiSF_6: {enable: true, if: 0, radio: 1}
      chan_multiSF_7: {enable: true, if: 200000, radio: 1}
      radio_0: {enable: true, freq: 902700000}
      radio_1: {enable: true, freq: 903500000}
pktfwd: {}
"#;

/// Router file template for a region.
pub fn router_yaml(region: Region) -> &'static str {
    match region {
        Region::Eu863 => EU863_ROUTER_YAML,
        Region::Us902 => US902_ROUTER_YAML,
    }
}
