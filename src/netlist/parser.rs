//! Line parser that builds a [`Circuit`] directly.

use std::collections::HashMap;

use super::value::parse_value;
use super::Netlist;
use crate::circuit::{Circuit, ComponentId, NodeId};
use crate::components::{
    Bjt, BjtParams, BjtType, Capacitor, CurrentSource, Diode, DiodeKind, DiodeParams,
    FunctionGenerator, Fuse, Inductor, Mosfet, MosfetParams, MosfetType, NoiseSource, OpAmp,
    OpAmpParams, Potentiometer, RampMode, Resistor, SourceSweep, SweepTarget, Switch,
    VoltageSource, WaveShape,
};
use crate::error::{Result, SimError};

/// One non-empty line split into positional fields and `key=value` options.
struct Line<'a> {
    number: usize,
    fields: Vec<&'a str>,
    options: HashMap<String, &'a str>,
}

impl<'a> Line<'a> {
    fn split(number: usize, text: &'a str) -> Self {
        let mut fields = Vec::new();
        let mut options = HashMap::new();
        for token in text.split_whitespace() {
            match token.split_once('=') {
                Some((key, value)) => {
                    options.insert(key.to_lowercase(), value);
                }
                None => fields.push(token),
            }
        }
        Self {
            number,
            fields,
            options,
        }
    }

    fn error(&self, message: impl Into<String>) -> SimError {
        SimError::netlist(self.number, message)
    }

    fn field(&self, index: usize, what: &str) -> Result<&'a str> {
        self.fields
            .get(index)
            .copied()
            .ok_or_else(|| self.error(format!("missing {what}")))
    }

    fn value(&self, index: usize, what: &str) -> Result<f64> {
        let text = self.field(index, what)?;
        parse_value(text).ok_or_else(|| self.error(format!("invalid {what} '{text}'")))
    }

    /// Positional value if present, otherwise `default`.
    fn value_or(&self, index: usize, what: &str, default: f64) -> Result<f64> {
        if index < self.fields.len() {
            self.value(index, what)
        } else {
            Ok(default)
        }
    }

    fn option(&self, key: &str) -> Result<Option<f64>> {
        match self.options.get(key) {
            Some(text) => parse_value(text)
                .map(Some)
                .ok_or_else(|| self.error(format!("invalid value '{text}' for option '{key}'"))),
            None => Ok(None),
        }
    }

    fn option_or(&self, key: &str, default: f64) -> Result<f64> {
        Ok(self.option(key)?.unwrap_or(default))
    }
}

/// Netlist parser state.
pub struct Parser {
    circuit: Circuit,
    temperature: Option<f64>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            circuit: Circuit::new(),
            temperature: None,
        }
    }

    /// Parse a whole netlist.
    pub fn parse(mut self, input: &str) -> Result<Netlist> {
        for (i, raw) in input.lines().enumerate() {
            let text = strip_comment(raw).trim();
            if text.is_empty() {
                continue;
            }
            let line = Line::split(i + 1, text);
            if text.starts_with('.') {
                if !self.parse_directive(&line)? {
                    break;
                }
            } else {
                self.parse_element(&line)?;
            }
        }
        Ok(Netlist {
            circuit: self.circuit,
            temperature: self.temperature,
        })
    }

    fn node(&mut self, line: &Line, index: usize) -> Result<NodeId> {
        let name = line.field(index, "node")?;
        if name == "0" || name.eq_ignore_ascii_case("gnd") {
            Ok(NodeId::GROUND)
        } else {
            Ok(self.circuit.add_node(name))
        }
    }

    fn nodes<const N: usize>(&mut self, line: &Line) -> Result<[NodeId; N]> {
        let mut nodes = [NodeId::GROUND; N];
        for (i, node) in nodes.iter_mut().enumerate() {
            *node = self.node(line, i + 1)?;
        }
        Ok(nodes)
    }

    /// Returns false on `.end`.
    fn parse_directive(&mut self, line: &Line) -> Result<bool> {
        let directive = line.field(0, "directive")?.to_lowercase();
        match directive.as_str() {
            ".probe" => {
                let node = self.node(line, 1)?;
                let name = line.fields.get(2).copied().unwrap_or(line.fields[1]);
                self.circuit
                    .add_probe(name, node)
                    .map_err(|err| line.error(err.to_string()))?;
            }
            ".temp" => {
                self.temperature = Some(line.value(1, "temperature")?);
            }
            ".end" => return Ok(false),
            _ => return Err(line.error(format!("unknown directive '{directive}'"))),
        }
        Ok(true)
    }

    fn parse_element(&mut self, line: &Line) -> Result<()> {
        let name = line.field(0, "element name")?;
        let upper = name.to_uppercase();
        let prefix = ["POT", "OP", "SW"]
            .into_iter()
            .find(|p| upper.starts_with(p))
            .unwrap_or(&upper[..upper.chars().next().map_or(0, char::len_utf8)]);

        if prefix == "W" {
            let [a, b] = self.nodes(line)?;
            return self.circuit.add_wire(a, b).map_err(|err| line.error(err.to_string()));
        }

        let result = match prefix {
            "R" => {
                let nodes = self.nodes(line)?;
                let r = line.value(3, "resistance")?;
                self.circuit.add(|id| Resistor::new(id, name, nodes, r))
            }
            "C" => {
                let nodes = self.nodes(line)?;
                let c = line.value(3, "capacitance")?;
                self.circuit.add(|id| Capacitor::new(id, name, nodes, c))
            }
            "L" => {
                let nodes = self.nodes(line)?;
                let l = line.value(3, "inductance")?;
                self.circuit.add(|id| Inductor::new(id, name, nodes, l))
            }
            "V" => self.parse_voltage_source(line, name),
            "I" => {
                let nodes = self.nodes(line)?;
                let i = line.value(3, "current")?;
                let rp = line.option("rp")?;
                self.circuit.add(|id| {
                    let source = CurrentSource::new(id, name, nodes, i);
                    match rp {
                        Some(rp) => source.with_parallel_resistance(rp),
                        None => source,
                    }
                })
            }
            "D" => {
                let nodes = self.nodes(line)?;
                let kind = match line.fields.get(3).map(|s| s.to_lowercase()).as_deref() {
                    None | Some("standard") | Some("d") => DiodeKind::Standard,
                    Some("zener") => DiodeKind::Zener,
                    Some("led") => DiodeKind::Led,
                    Some("schottky") => DiodeKind::Schottky,
                    Some(other) => return Err(line.error(format!("unknown diode type '{other}'"))),
                };
                let base = DiodeParams::for_kind(kind);
                let params = DiodeParams {
                    is: line.option_or("is", base.is)?,
                    n: line.option_or("n", base.n)?,
                    bv: line.option("bv")?.or(base.bv),
                };
                self.circuit.add(|id| Diode::new(id, name, nodes, kind).with_params(params))
            }
            "Q" => {
                let nodes = self.nodes(line)?;
                let kind = match line.fields.get(4).map(|s| s.to_lowercase()).as_deref() {
                    None | Some("npn") => BjtType::Npn,
                    Some("pnp") => BjtType::Pnp,
                    Some(other) => return Err(line.error(format!("unknown transistor type '{other}'"))),
                };
                let base = BjtParams::default();
                let params = BjtParams {
                    is: line.option_or("is", base.is)?,
                    beta_f: line.option_or("bf", base.beta_f)?,
                    beta_r: line.option_or("br", base.beta_r)?,
                    nf: line.option_or("nf", base.nf)?,
                    nr: line.option_or("nr", base.nr)?,
                    vaf: line.option_or("vaf", base.vaf)?,
                    ikf: line.option_or("ikf", base.ikf)?,
                };
                self.circuit.add(|id| Bjt::new(id, name, nodes, kind, params))
            }
            "M" => {
                let nodes = self.nodes(line)?;
                let kind = match line.fields.get(4).map(|s| s.to_lowercase()).as_deref() {
                    None | Some("nmos") => MosfetType::Nmos,
                    Some("pmos") => MosfetType::Pmos,
                    Some(other) => return Err(line.error(format!("unknown MOSFET type '{other}'"))),
                };
                let base = MosfetParams::default();
                let params = MosfetParams {
                    vto: line.option_or("vto", base.vto)?,
                    kp: line.option_or("kp", base.kp)?,
                    w: line.option_or("w", base.w)?,
                    l: line.option_or("l", base.l)?,
                    lambda: line.option_or("lambda", base.lambda)?,
                };
                self.circuit.add(|id| Mosfet::new(id, name, nodes, kind, params))
            }
            "OP" => {
                let nodes = self.nodes(line)?;
                let base = match line.fields.get(4) {
                    Some(model) => OpAmpParams::preset(model)
                        .ok_or_else(|| line.error(format!("unknown op-amp model '{model}'")))?,
                    None => OpAmpParams::default(),
                };
                let params = OpAmpParams {
                    gain: line.option_or("gain", base.gain)?,
                    r_out: line.option_or("rout", base.r_out)?,
                    r_in: line.option_or("rin", base.r_in)?,
                    v_rail_pos: line.option_or("vpos", base.v_rail_pos)?,
                    v_rail_neg: line.option_or("vneg", base.v_rail_neg)?,
                };
                self.circuit.add(|id| OpAmp::new(id, name, nodes, params))
            }
            "POT" => {
                let nodes = self.nodes(line)?;
                let total = line.value(4, "resistance")?;
                let position = match line.option("pos")? {
                    Some(p) => p,
                    None => line.value_or(5, "wiper position", 0.5)?,
                };
                self.circuit.add(|id| Potentiometer::new(id, name, nodes, total, position))
            }
            "SW" => {
                let nodes = self.nodes(line)?;
                let closed = match line.fields.get(3).map(|s| s.to_lowercase()).as_deref() {
                    None | Some("off") | Some("open") | Some("0") => false,
                    Some("on") | Some("closed") | Some("1") => true,
                    Some(other) => return Err(line.error(format!("unknown switch state '{other}'"))),
                };
                self.circuit.add(|id| Switch::new(id, name, nodes, closed))
            }
            "F" => {
                let nodes = self.nodes(line)?;
                let rating = line.value(3, "current rating")?;
                let i2t = line.option("i2t")?;
                let r = line.option("r")?;
                self.circuit.add(|id| {
                    let mut fuse = Fuse::new(id, name, nodes, rating);
                    if let Some(i2t) = i2t {
                        fuse = fuse.with_i2t(i2t);
                    }
                    if let Some(r) = r {
                        fuse.resistance = r;
                    }
                    fuse
                })
            }
            "N" => {
                let nodes = self.nodes(line)?;
                let rms = match line.option("rms")? {
                    Some(v) => v,
                    None => line.value_or(3, "noise amplitude", 0.1)?,
                };
                let bandwidth = match line.option("bw")? {
                    Some(v) => v,
                    None => line.value_or(4, "noise bandwidth", 10e3)?,
                };
                if bandwidth <= 0.0 {
                    return Err(line.error("noise bandwidth must be positive"));
                }
                let seed = line.option_or("seed", 1.0)? as u64;
                let offset = line.option_or("offset", 0.0)?;
                let rs = line.option_or("rs", 0.0)?;
                self.circuit.add(|id| {
                    NoiseSource::new(id, name, nodes, rms, bandwidth, seed)
                        .with_offset(offset)
                        .with_series_resistance(rs)
                })
            }
            _ => return Err(line.error(format!("unknown element '{name}'"))),
        };

        result.map(|_| ()).map_err(|err| match err {
            SimError::Netlist { .. } => err,
            other => line.error(other.to_string()),
        })
    }

    /// `V` lines are DC sources, or function generators when the first
    /// field after the nodes names a wave shape.
    fn parse_voltage_source(&mut self, line: &Line, name: &str) -> Result<ComponentId> {
        let nodes = self.nodes(line)?;
        let rs = line.option_or("rs", 0.0)?;

        let Some(shape) = line.fields.get(3).and_then(|s| WaveShape::parse(s)) else {
            let v = line.value(3, "voltage")?;
            return self
                .circuit
                .add(|id| VoltageSource::new(id, name, nodes, v).with_series_resistance(rs));
        };

        let amplitude = match line.option("amp")? {
            Some(a) => a,
            None => line.value_or(4, "amplitude", 1.0)?,
        };
        let frequency = match line.option("freq")? {
            Some(f) => f,
            None => line.value_or(5, "frequency", 1e3)?,
        };
        if frequency <= 0.0 {
            return Err(line.error("frequency must be positive"));
        }
        let offset = line.option_or("offset", 0.0)?;
        let phase = line.option_or("phase", 0.0)?;
        let duty = line.option_or("duty", 0.5)?;
        let sweep = self.parse_sweep(line)?;

        self.circuit.add(|id| {
            let generator = FunctionGenerator::new(id, name, nodes, shape, amplitude, frequency)
                .with_offset(offset)
                .with_phase(phase)
                .with_duty(duty)
                .with_series_resistance(rs);
            match sweep {
                Some(sweep) => generator.with_sweep(sweep),
                None => generator,
            }
        })
    }

    /// `sweep=freq|amp` with `sweep_mode=lin|log|step`, `sweep_steps`,
    /// `sweep_start`, `sweep_end`, `sweep_time` and `sweep_repeat`.
    fn parse_sweep(&self, line: &Line) -> Result<Option<SourceSweep>> {
        let Some(target) = line.options.get("sweep") else {
            return Ok(None);
        };
        let target = match target.to_lowercase().as_str() {
            "freq" | "frequency" => SweepTarget::Frequency,
            "amp" | "amplitude" => SweepTarget::Amplitude,
            other => return Err(line.error(format!("unknown sweep target '{other}'"))),
        };
        let mode = match line.options.get("sweep_mode").map(|s| s.to_lowercase()).as_deref() {
            None | Some("lin") | Some("linear") => RampMode::Linear,
            Some("log") | Some("logarithmic") => RampMode::Logarithmic,
            Some("step") | Some("stepped") => RampMode::Stepped {
                steps: line.option_or("sweep_steps", 10.0)? as usize,
            },
            Some(other) => return Err(line.error(format!("unknown sweep mode '{other}'"))),
        };
        let start = line
            .option("sweep_start")?
            .ok_or_else(|| line.error("sweep needs sweep_start"))?;
        let end = line
            .option("sweep_end")?
            .ok_or_else(|| line.error("sweep needs sweep_end"))?;
        Ok(Some(SourceSweep {
            target,
            mode,
            start,
            end,
            duration: line.option_or("sweep_time", 1.0)?,
            repeat: line.option_or("sweep_repeat", 0.0)? != 0.0,
        }))
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find(['#', ';']) {
        Some(pos) => &line[..pos],
        None => line,
    }
}
