// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Parser for the declarative DSP pipeline description: a small sectioned
//! `key=value` format where every section is a plugin instance.
//!
//! Reserved keys are `library`/`label`/`purpose`/`disable`; ports are
//! declared by an `input_<n>`/`output_<n>` scan (try `input_<n>`, fall back
//! to `output_<n>`, stop at the first index that is neither). Flows are
//! interned by name, and the post-parse `swap_lr`/`quad_rotation` rewrites
//! splice a builtin channel-reordering plugin in front of the playback
//! sink. The rewrites must re-resolve the sink's index after insertion,
//! since shifting every later plugin's position on insert means any index
//! captured before the splice is stale afterward.

use std::collections::HashMap;

use super::expr::{DisableExpr, ExprParseError};

pub const MAX_MOCK_INI_CHANNELS: u8 = 20;

#[derive(Debug, thiserror::Error)]
pub enum DspIniError {
    #[error("section {0:?} is missing required key {1:?}")]
    MissingKey(String, &'static str),
    #[error("line {0}: expected `[section]` or `key=value`, got {1:?}")]
    Malformed(usize, String),
    #[error("section {0:?}: invalid disable expression: {1}")]
    BadDisableExpr(String, ExprParseError),
    #[error("port value for {0:?} {1} is neither a flow name nor a number")]
    BadPortValue(String, String),
}

/// A value bound to a plugin port: either a named flow shared with another
/// plugin, or a literal constant (used for e.g. a silence-generating source
/// with no real input).
#[derive(Debug, Clone, PartialEq)]
pub enum PortValue {
    Flow(usize),
    Literal(f32),
}

#[derive(Debug, Clone)]
pub struct PluginDef {
    pub section: String,
    pub library: String,
    pub label: String,
    pub purpose: Option<String>,
    pub disable: Option<DisableExpr>,
    pub input_ports: Vec<PortValue>,
    pub output_ports: Vec<PortValue>,
}

#[derive(Debug, Clone, Default)]
pub struct Flow {
    pub name: String,
    pub producer: Option<(usize, u32)>,
    pub consumer: Option<(usize, u32)>,
}

#[derive(Debug, Clone, Default)]
pub struct DspIni {
    pub plugins: Vec<PluginDef>,
    pub flows: Vec<Flow>,
}

impl DspIni {
    pub fn parse(text: &str) -> Result<Self, DspIniError> {
        let dict = parse_sections(text)?;
        let mut ini = DspIni::default();
        for section in &dict.section_order {
            let plugin = parse_plugin_section(&dict, section, &mut ini.flows)?;
            ini.plugins.push(plugin);
        }
        fill_flow_info(&mut ini);
        insert_swap_lr_plugin(&mut ini);
        insert_quad_rotation_plugin(&mut ini);
        fill_flow_info(&mut ini);
        Ok(ini)
    }

    fn lookup_or_add_flow(&mut self, name: &str) -> usize {
        lookup_or_add_flow(&mut self.flows, name)
    }
}

fn lookup_or_add_flow(flows: &mut Vec<Flow>, name: &str) -> usize {
    if let Some(idx) = flows.iter().position(|f| f.name == name) {
        return idx;
    }
    flows.push(Flow {
        name: name.to_string(),
        producer: None,
        consumer: None,
    });
    flows.len() - 1
}

struct SectionDict {
    section_order: Vec<String>,
    values: HashMap<String, String>,
}

impl SectionDict {
    fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.values.get(&format!("{section}:{key}")).map(String::as_str)
    }
}

fn parse_sections(text: &str) -> Result<SectionDict, DspIniError> {
    let mut section_order = Vec::new();
    let mut values = HashMap::new();
    let mut current: Option<String> = None;

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(stripped) = line.strip_prefix('[') {
            let name = stripped
                .strip_suffix(']')
                .ok_or_else(|| DspIniError::Malformed(lineno + 1, line.to_string()))?;
            section_order.push(name.to_string());
            current = Some(name.to_string());
            continue;
        }
        let section = current
            .clone()
            .ok_or_else(|| DspIniError::Malformed(lineno + 1, line.to_string()))?;
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| DspIniError::Malformed(lineno + 1, line.to_string()))?;
        values.insert(format!("{section}:{}", key.trim()), value.trim().to_string());
    }

    Ok(SectionDict { section_order, values })
}

/// Scan `input_<n>`/`output_<n>` keys for `section`, stopping at the first
/// index where neither is present — matching the reference parser's single
/// shared counter rather than two independent scans.
fn parse_ports(
    dict: &SectionDict,
    section: &str,
    flows: &mut Vec<Flow>,
) -> Result<(Vec<PortValue>, Vec<PortValue>), DspIniError> {
    let mut inputs = Vec::new();
    let mut outputs = Vec::new();
    let mut n = 0u32;
    loop {
        if let Some(value) = dict.get(section, &format!("input_{n}")) {
            inputs.push(parse_port_value(section, value, flows)?);
        } else if let Some(value) = dict.get(section, &format!("output_{n}")) {
            outputs.push(parse_port_value(section, value, flows)?);
        } else {
            break;
        }
        n += 1;
    }
    Ok((inputs, outputs))
}

fn parse_port_value(section: &str, value: &str, flows: &mut Vec<Flow>) -> Result<PortValue, DspIniError> {
    if value.is_empty() {
        return Err(DspIniError::BadPortValue(section.to_string(), value.to_string()));
    }
    if let Ok(literal) = value.parse::<f32>() {
        return Ok(PortValue::Literal(literal));
    }
    Ok(PortValue::Flow(lookup_or_add_flow(flows, value)))
}

fn parse_plugin_section(
    dict: &SectionDict,
    section: &str,
    flows: &mut Vec<Flow>,
) -> Result<PluginDef, DspIniError> {
    let library = dict
        .get(section, "library")
        .ok_or_else(|| DspIniError::MissingKey(section.to_string(), "library"))?
        .to_string();
    let label = dict
        .get(section, "label")
        .ok_or_else(|| DspIniError::MissingKey(section.to_string(), "label"))?
        .to_string();
    let purpose = dict.get(section, "purpose").map(str::to_string);
    let disable = match dict.get(section, "disable") {
        Some(expr) => Some(DisableExpr::parse(expr).map_err(|e| DspIniError::BadDisableExpr(section.to_string(), e))?),
        None => None,
    };
    let (input_ports, output_ports) = parse_ports(dict, section, flows)?;

    Ok(PluginDef {
        section: section.to_string(),
        library,
        label,
        purpose,
        disable,
        input_ports,
        output_ports,
    })
}

/// Resolve each flow's producer (the plugin/port writing to it) and consumer
/// (the plugin/port reading from it) by scanning every plugin's ports.
/// Called once after the initial parse and again after the builtin-plugin
/// rewrites, since those insert new flows and new producer/consumer pairs.
fn fill_flow_info(ini: &mut DspIni) {
    for flow in &mut ini.flows {
        flow.producer = None;
        flow.consumer = None;
    }
    for (plugin_idx, plugin) in ini.plugins.iter().enumerate() {
        for (port, value) in plugin.output_ports.iter().enumerate() {
            if let PortValue::Flow(flow_idx) = value {
                ini.flows[*flow_idx].producer = Some((plugin_idx, port as u32));
            }
        }
        for (port, value) in plugin.input_ports.iter().enumerate() {
            if let PortValue::Flow(flow_idx) = value {
                ini.flows[*flow_idx].consumer = Some((plugin_idx, port as u32));
            }
        }
    }
}

fn find_first_playback_sink_plugin(ini: &DspIni, channels: usize) -> Option<usize> {
    ini.plugins.iter().position(|p| {
        p.purpose.as_deref() == Some("playback") && p.input_ports.len() == channels
    })
}

/// Splice a 2-channel `swap_lr` builtin in front of the first playback sink
/// that takes exactly 2 inputs, gated by `swap_lr_disabled`.
fn insert_swap_lr_plugin(ini: &mut DspIni) {
    insert_channel_rewrite_plugin(ini, 2, "swap_lr", Some("swap_lr_disabled"));
}

/// Splice a 4-channel `quad_rotation` builtin in front of the first playback
/// sink that takes exactly 4 inputs. Unlike `swap_lr` this has no disable
/// expression: it undoes a fixed hardware channel wiring rather than a
/// user-toggleable preference.
fn insert_quad_rotation_plugin(ini: &mut DspIni) {
    insert_channel_rewrite_plugin(ini, 4, "quad_rotation", None);
}

/// Splices a channel-rewrite builtin (`swap_lr`/`quad_rotation`) between the
/// first matching playback sink and whatever used to feed it directly. The
/// sink's ports are rebound 1:1 to the new plugin's same-indexed outputs
/// (`dest_port` -> `__{label}_out_{dest_port}`); the actual channel
/// permutation happens inside the plugin's own run step
/// ([`super::builtin::BuiltinKind::run`]), not in this wiring. That keeps a
/// disabled rewrite plugin a transparent passthrough instead of a silent
/// one: its output flows carry whatever its disabled-bypass copy produces,
/// not a swap the sink's wiring already baked in.
fn insert_channel_rewrite_plugin(ini: &mut DspIni, channels: usize, label: &str, disable_flag: Option<&str>) {
    let Some(sink_idx) = find_first_playback_sink_plugin(ini, channels) else {
        return;
    };

    let original_flow_names: Vec<String> = (0..channels)
        .map(|port| match &ini.plugins[sink_idx].input_ports[port] {
            PortValue::Flow(idx) => ini.flows[idx.to_owned()].name.clone(),
            PortValue::Literal(v) => format!("__literal_{v}_{port}"),
        })
        .collect();

    let rewrite_out_names: Vec<String> = (0..channels)
        .map(|port| format!("__{label}_out_{port}"))
        .collect();

    let rewrite_plugin = PluginDef {
        section: format!("__builtin_{label}"),
        library: "builtin".to_string(),
        label: label.to_string(),
        purpose: None,
        disable: disable_flag.map(|f| DisableExpr::Flag(f.to_string())),
        input_ports: original_flow_names
            .iter()
            .map(|name| PortValue::Flow(ini.lookup_or_add_flow(name)))
            .collect(),
        output_ports: rewrite_out_names
            .iter()
            .map(|name| PortValue::Flow(ini.lookup_or_add_flow(name)))
            .collect(),
    };

    ini.plugins.insert(sink_idx, rewrite_plugin);

    // Look up the sink again: inserting above shifted every later plugin's
    // index by one, so the index we captured before the insert no longer
    // points at the sink.
    let sink_idx = sink_idx + 1;

    for (dest_port, out_name) in rewrite_out_names.iter().enumerate() {
        let flow_idx = ini.lookup_or_add_flow(out_name);
        ini.plugins[sink_idx].input_ports[dest_port] = PortValue::Flow(flow_idx);
    }
}

/// Build a trivial source -> sink pipeline for tests, capped at
/// [`MAX_MOCK_INI_CHANNELS`].
pub fn create_mock_ini(channels: u8) -> DspIni {
    let channels = channels.min(MAX_MOCK_INI_CHANNELS) as usize;
    let mut ini = DspIni::default();
    let flow_names: Vec<String> = (0..channels).map(|c| format!("mock_flow_{c}")).collect();
    let flows: Vec<PortValue> = flow_names
        .iter()
        .map(|name| PortValue::Flow(lookup_or_add_flow(&mut ini.flows, name)))
        .collect();

    ini.plugins.push(PluginDef {
        section: "source".to_string(),
        library: "builtin".to_string(),
        label: "source".to_string(),
        purpose: Some("capture".to_string()),
        disable: None,
        input_ports: Vec::new(),
        output_ports: flows.clone(),
    });
    ini.plugins.push(PluginDef {
        section: "sink".to_string(),
        library: "builtin".to_string(),
        label: "sink".to_string(),
        purpose: Some("playback".to_string()),
        disable: None,
        input_ports: flows,
        output_ports: Vec::new(),
    });
    fill_flow_info(&mut ini);
    ini
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEREO_INI: &str = "
[src]
library=builtin
label=source
purpose=capture
output_0=a
output_1=b

[dst]
library=builtin
label=sink
purpose=playback
input_0=a
input_1=b
";

    #[test]
    fn parses_minimal_stereo_pipeline() {
        let ini = DspIni::parse(STEREO_INI).unwrap();
        // swap_lr is inserted automatically in front of the playback sink.
        assert_eq!(ini.plugins.len(), 3);
        assert_eq!(ini.plugins[1].label, "swap_lr");
        assert_eq!(
            ini.plugins[1].disable,
            Some(DisableExpr::Flag("swap_lr_disabled".to_string()))
        );
    }

    #[test]
    fn swap_lr_rewires_sink_inputs_through_the_insert() {
        let ini = DspIni::parse(STEREO_INI).unwrap();
        let sink = ini.plugins.last().unwrap();
        assert_eq!(sink.label, "sink");
        // Sink's inputs now come from swap_lr's outputs, not the original
        // flows, bound in order: port 0 -> out_0, port 1 -> out_1. The swap
        // itself happens inside swap_lr's run step, not in this wiring.
        let names: Vec<&str> = sink
            .input_ports
            .iter()
            .map(|port| match port {
                PortValue::Flow(idx) => ini.flows[*idx].name.as_str(),
                PortValue::Literal(_) => panic!("expected a flow"),
            })
            .collect();
        assert_eq!(names, vec!["__swap_lr_out_0", "__swap_lr_out_1"]);
    }

    #[test]
    fn missing_library_key_is_an_error() {
        let bad = "[x]\nlabel=foo\n";
        assert!(matches!(DspIni::parse(bad), Err(DspIniError::MissingKey(_, "library"))));
    }

    #[test]
    fn mock_ini_caps_channel_count() {
        let ini = create_mock_ini(64);
        assert_eq!(ini.plugins[0].output_ports.len(), MAX_MOCK_INI_CHANNELS as usize);
    }

    #[test]
    fn quad_rotation_has_no_disable_expression() {
        let four_ch = "
[src]
library=builtin
label=source
purpose=capture
output_0=a
output_1=b
output_2=c
output_3=d

[dst]
library=builtin
label=sink
purpose=playback
input_0=a
input_1=b
input_2=c
input_3=d
";
        let ini = DspIni::parse(four_ch).unwrap();
        let quad = ini.plugins.iter().find(|p| p.label == "quad_rotation").unwrap();
        assert!(quad.disable.is_none());
    }
}
