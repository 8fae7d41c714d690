//! Netlist reader for circuit descriptions.
//!
//! A SPICE-flavoured, line-oriented text format. Each line holds one
//! element, one directive or nothing.
//!
//! # Grammar Overview
//!
//! ```text
//! line      = comment | directive | element | empty
//! comment   = ('#' | ';') { any_char }
//! directive = ".probe" node [name] | ".temp" value | ".end"
//! element   = name node+ { field } { key '=' value }
//! value     = number [suffix] [unit]
//! suffix    = 'p' | 'n' | 'u' | 'm' | 'k' | "meg" | 'M' | 'g'
//! ```
//!
//! The element kind comes from the name prefix. Node `0` (or `GND`) is
//! ground.
//!
//! | Prefix | Element | Syntax |
//! |--------|---------|--------|
//! | R | Resistor | `R<name> <n+> <n-> <value>` |
//! | C | Capacitor | `C<name> <n+> <n-> <value>` |
//! | L | Inductor | `L<name> <n+> <n-> <value>` |
//! | V | DC source | `V<name> <n+> <n-> <volts> [rs=]` |
//! | V | Function generator | `V<name> <n+> <n-> <shape> [amp] [freq] [offset= phase= duty= rs= sweep=...]` |
//! | I | Current source | `I<name> <from> <to> <amps> [rp=]` |
//! | D | Diode | `D<name> <anode> <cathode> [standard\|zener\|led\|schottky] [is= n= bv=]` |
//! | Q | BJT | `Q<name> <c> <b> <e> [npn\|pnp] [is= bf= br= nf= nr= vaf= ikf=]` |
//! | M | MOSFET | `M<name> <d> <g> <s> [nmos\|pmos] [vto= kp= w= l= lambda=]` |
//! | OP | Op-amp | `OP<name> <out> <in+> <in-> [model] [gain= rout= rin= vpos= vneg=]` |
//! | POT | Potentiometer | `POT<name> <n1> <wiper> <n2> <value> [position]` |
//! | SW | Switch | `SW<name> <n1> <n2> [on\|off]` |
//! | F | Fuse | `F<name> <n1> <n2> <rating> [i2t= r=]` |
//! | N | Noise source | `N<name> <n+> <n-> [rms] [bandwidth] [seed= offset= rs=]` |
//! | W | Wire | `W<name> <n1> <n2>` |
//!
//! # Example
//!
//! ```text
//! # RC low-pass
//! V1  in  0    sine 1 1k
//! R1  in  out  10k
//! C1  out 0    100n
//! .probe out
//! .temp 25
//! ```

mod parser;
mod value;

pub use parser::Parser;
pub use value::parse_value;

use std::path::Path;

use crate::circuit::Circuit;
use crate::error::{Result, SimError};

/// A parsed netlist.
#[derive(Debug, Clone)]
pub struct Netlist {
    pub circuit: Circuit,
    /// Ambient temperature from `.temp`, if given
    pub temperature: Option<f64>,
}

/// Parse netlist text.
pub fn parse_netlist(input: &str) -> Result<Netlist> {
    Parser::new().parse(input)
}

/// Read and parse a netlist file.
pub fn parse_file(path: &Path) -> Result<Netlist> {
    let content = std::fs::read_to_string(path).map_err(|e| SimError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_netlist(&content)
}
