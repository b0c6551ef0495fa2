// Licensed under the Apache-2.0 license

//! Rendering of the generated SystemVerilog.
//!
//! [`GeneratedDecoder`] collects what the emitter needs from a
//! [`Synthesis`] and renders the pieces that depend on the decode table and
//! the parameter classification:
//!
//! ```text
//! Synthesis → GeneratedDecoder → SystemVerilog text
//!             ├── generate_package()              → <module>_pkg constants
//!             ├── generate_module_parameters()    → #( parameter int ... )
//!             ├── generate_parameter_assertions() → bound checks
//!             ├── generate_select_struct()        → cpuif_sel_t
//!             ├── generate_decode_logic(access)   → rd / wr select logic
//!             └── generate_fanout_addresses()     → per-child addresses
//! ```
//!
//! A map without address-modifying parameters renders exactly like a map
//! without parameters.

use crate::cpuif::{Access, CpuifAdapter, PortDirection};
use crate::decode::ERROR_MEMBER;
use crate::params::ParameterRole;
use crate::synth::Synthesis;
use crate::util::sv_int;
use std::fmt::Write;

//=============================================================================
// Generated Types
//=============================================================================

/// A runtime-configurable parameter of the decoder.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GeneratedParameter {
    pub name: String,
    /// Elaborated value; also the upper bound.
    pub max: u64,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GeneratedLevel {
    pub stride: u64,
    /// Static element count used for sizing.
    pub count: u64,
    /// Loop bound: the gating parameter, or the count.
    pub bound: String,
}

/// One select line (or indexed group of select lines).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GeneratedUnit {
    pub ident: String,
    pub base: u64,
    pub size: u64,
    /// Width of the address a child decodes.
    pub addr_width: u64,
    pub levels: Vec<GeneratedLevel>,
    /// Unrolled elements that exist only while `index < param`.
    pub gates: Vec<(String, u64)>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GeneratedPort {
    pub name: String,
    pub direction: PortDirection,
    pub width: u64,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GeneratedDecoder {
    pub module_name: String,
    pub package_name: String,
    pub data_width: u64,
    pub addr_width: u64,
    pub parameters: Vec<GeneratedParameter>,
    pub units: Vec<GeneratedUnit>,
    pub ports: Vec<GeneratedPort>,
    /// Children receive addresses relative to their own base.
    pub local_addressing: bool,
}

impl From<&Synthesis> for GeneratedDecoder {
    fn from(s: &Synthesis) -> Self {
        let parameters = s
            .parameters
            .parameters
            .iter()
            .filter_map(|p| match &p.role {
                ParameterRole::AddressModifying { bound, .. } => Some(GeneratedParameter {
                    name: p.name.clone(),
                    max: bound.max,
                }),
                _ => None,
            })
            .collect();
        let units = s
            .decode
            .entries()
            .iter()
            .map(|e| GeneratedUnit {
                ident: e.ident(),
                base: e.condition.base,
                size: e.condition.size,
                addr_width: e.condition.addr_width(),
                levels: e
                    .condition
                    .levels
                    .iter()
                    .map(|l| GeneratedLevel {
                        stride: l.stride,
                        count: l.count,
                        bound: l.enable.clone().unwrap_or_else(|| l.count.to_string()),
                    })
                    .collect(),
                gates: e
                    .condition
                    .gates
                    .iter()
                    .map(|g| (g.param.clone(), g.index))
                    .collect(),
            })
            .collect();
        let ports = s
            .adapter
            .ports()
            .into_iter()
            .map(|p| GeneratedPort {
                name: format!("s_cpuif_{}", p.name.to_lowercase()),
                direction: p.direction,
                width: p.width.bits(s.addr_width, s.data_width),
            })
            .collect();
        Self {
            module_name: s.module_name.clone(),
            package_name: s.package_name.clone(),
            data_width: s.data_width,
            addr_width: s.addr_width,
            parameters,
            units,
            ports,
            local_addressing: s.adapter.forwards_local_address(),
        }
    }
}

//=============================================================================
// Code Generation
//=============================================================================

impl GeneratedDecoder {
    fn prefix(&self) -> String {
        self.module_name.to_uppercase()
    }

    /// The companion package with width constants and parameter maxima.
    pub fn generate_package(&self) -> String {
        let mut output = String::new();
        let prefix = self.prefix();
        writeln!(output, "package {};", self.package_name).unwrap();
        writeln!(output, "    localparam {prefix}_DATA_WIDTH = {};", self.data_width).unwrap();
        writeln!(output, "    localparam {prefix}_MIN_ADDR_WIDTH = {};", self.addr_width).unwrap();
        for p in &self.parameters {
            writeln!(output, "    localparam {prefix}_MAX_{} = {};", p.name, p.max).unwrap();
        }
        for u in &self.units {
            let ident = u.ident.to_uppercase();
            let width = u.addr_width;
            writeln!(output, "    localparam {prefix}_{ident}_ADDR_WIDTH = {width};").unwrap();
        }
        writeln!(output, "endpackage").unwrap();
        output
    }

    /// Module parameter declarations, one per line, without separators.
    pub fn generate_module_parameters(&self) -> Vec<String> {
        self.parameters
            .iter()
            .map(|p| format!("parameter int {} = {}", p.name, p.max))
            .collect()
    }

    /// Elaboration-time bound checks. Empty for a static decoder.
    pub fn generate_parameter_assertions(&self) -> String {
        if self.parameters.is_empty() {
            return String::new();
        }
        let mut output = String::new();
        writeln!(output, "    // Parameter constraints").unwrap();
        writeln!(output, "    initial begin").unwrap();
        for p in &self.parameters {
            let name = &p.name;
            writeln!(
                output,
                "        assert_{}: assert ({name} >= 0 && {name} <= {})",
                name.to_lowercase(),
                p.max
            )
            .unwrap();
            writeln!(
                output,
                "            else $error(\"{name} must be between 0 and {}\");",
                p.max
            )
            .unwrap();
        }
        writeln!(output, "    end").unwrap();
        output
    }

    /// The select struct, sized by the static maximum of every array.
    pub fn generate_select_struct(&self) -> String {
        let mut output = String::new();
        writeln!(output, "    typedef struct {{").unwrap();
        for u in &self.units {
            let dims: String = u.levels.iter().map(|l| format!("[{}]", l.count)).collect();
            writeln!(output, "        logic {}{dims};", u.ident).unwrap();
        }
        writeln!(output, "        logic {ERROR_MEMBER};").unwrap();
        writeln!(output, "    }} cpuif_sel_t;").unwrap();
        output
    }

    /// Combinational select logic for one access direction.
    pub fn generate_decode_logic(&self, access: Access) -> String {
        let flavor = match access {
            Access::Read => "rd",
            Access::Write => "wr",
        };
        let addr = format!("cpuif_{flavor}_addr");
        let sel = format!("cpuif_{flavor}_sel");
        let aw = self.addr_width;

        let mut output = String::new();
        writeln!(output, "    always_comb begin").unwrap();
        writeln!(output, "        {sel} = '{{default: '0}};").unwrap();
        writeln!(output, "        if (cpuif_req && cpuif_{flavor}_en) begin").unwrap();
        for u in &self.units {
            let mut indent = "            ".to_string();
            for (i, l) in u.levels.iter().enumerate() {
                writeln!(
                    output,
                    "{indent}for (int i{i} = 0; i{i} < {}; i{i}++) begin",
                    l.bound
                )
                .unwrap();
                indent.push_str("    ");
            }
            let mut lo = sv_int(u.base, aw);
            for (i, l) in u.levels.iter().enumerate() {
                write!(lo, " + ({aw}'(i{i})*{})", sv_int(l.stride, aw)).unwrap();
            }
            let mut cond = format!(
                "({addr} >= ({lo})) && ({addr} < ({lo} + {}))",
                sv_int(u.size, aw + 1)
            );
            for (param, index) in &u.gates {
                write!(cond, " && ({param} > {index})").unwrap();
            }
            let index: String = (0..u.levels.len()).map(|i| format!("[i{i}]")).collect();
            writeln!(output, "{indent}if ({cond}) begin").unwrap();
            writeln!(output, "{indent}    {sel}.{}{index} = 1'b1;", u.ident).unwrap();
            writeln!(output, "{indent}end").unwrap();
            for _ in &u.levels {
                indent.truncate(indent.len() - 4);
                writeln!(output, "{indent}end").unwrap();
            }
        }
        writeln!(output, "            if ({sel} == '{{default: '0}}) begin").unwrap();
        writeln!(output, "                {sel}.{ERROR_MEMBER} = 1'b1;").unwrap();
        writeln!(output, "            end").unwrap();
        writeln!(output, "        end").unwrap();
        writeln!(output, "    end").unwrap();
        output
    }

    /// Address forwarded to each child: relative to the selected element and
    /// truncated to the child's width, or the full address when children
    /// decode it themselves.
    pub fn generate_fanout_addresses(&self) -> String {
        let aw = self.addr_width;
        let prefix = self.prefix();
        let mut output = String::new();
        writeln!(output, "    // Child addresses").unwrap();
        writeln!(output, "    logic [{}:0] cpuif_addr;", aw - 1).unwrap();
        writeln!(
            output,
            "    assign cpuif_addr = cpuif_wr_en ? cpuif_wr_addr : cpuif_rd_addr;"
        )
        .unwrap();
        for u in &self.units {
            let name = format!("{}_addr", u.ident);
            let width = format!("{prefix}_{}_ADDR_WIDTH", u.ident.to_uppercase());
            let dims: String = u.levels.iter().map(|l| format!("[{}]", l.count)).collect();
            if self.local_addressing {
                writeln!(output, "    logic [{width}-1:0] {name}{dims};").unwrap();
            } else {
                writeln!(output, "    logic [{}:0] {name}{dims};", aw - 1).unwrap();
            }

            let mut indent = "    ".to_string();
            for (i, l) in u.levels.iter().enumerate() {
                writeln!(
                    output,
                    "{indent}for (genvar gi{i} = 0; gi{i} < {}; gi{i}++) begin : g_{name}_{i}",
                    l.count
                )
                .unwrap();
                indent.push_str("    ");
            }
            let index: String = (0..u.levels.len()).map(|i| format!("[gi{i}]")).collect();
            let value = if self.local_addressing {
                let mut rel = format!("cpuif_addr - {}", sv_int(u.base, aw));
                for (i, l) in u.levels.iter().enumerate() {
                    write!(rel, " - {aw}'(gi{i}*{})", sv_int(l.stride, aw)).unwrap();
                }
                format!("{width}'({rel})")
            } else {
                "cpuif_addr".to_string()
            };
            writeln!(output, "{indent}assign {name}{index} = {value};").unwrap();
            for _ in &u.levels {
                indent.truncate(indent.len() - 4);
                writeln!(output, "{indent}end").unwrap();
            }
        }
        output
    }

    /// The decoder module around the generated pieces. The per-protocol
    /// handshake logic is supplied by the external template.
    pub fn generate_module(&self) -> String {
        let mut output = String::new();
        let params = self.generate_module_parameters();
        if params.is_empty() {
            writeln!(output, "module {} (", self.module_name).unwrap();
        } else {
            writeln!(output, "module {} #(", self.module_name).unwrap();
            writeln!(output, "    {}", params.join(",\n    ")).unwrap();
            writeln!(output, ") (").unwrap();
        }
        let mut ports = vec![
            "input logic clk".to_string(),
            "input logic rst".to_string(),
        ];
        for p in &self.ports {
            let dir = match p.direction {
                PortDirection::Input => "input",
                PortDirection::Output => "output",
            };
            if p.width == 1 {
                ports.push(format!("{dir} logic {}", p.name));
            } else {
                ports.push(format!("{dir} logic [{}:0] {}", p.width - 1, p.name));
            }
        }
        writeln!(output, "    {}", ports.join(",\n    ")).unwrap();
        writeln!(output, ");").unwrap();
        writeln!(output, "    import {}::*;", self.package_name).unwrap();
        writeln!(output).unwrap();
        write!(output, "{}", self.generate_parameter_assertions()).unwrap();
        write!(output, "{}", self.generate_select_struct()).unwrap();
        writeln!(output, "    cpuif_sel_t cpuif_rd_sel;").unwrap();
        writeln!(output, "    cpuif_sel_t cpuif_wr_sel;").unwrap();
        writeln!(output).unwrap();
        write!(output, "{}", self.generate_decode_logic(Access::Read)).unwrap();
        write!(output, "{}", self.generate_decode_logic(Access::Write)).unwrap();
        write!(output, "{}", self.generate_fanout_addresses()).unwrap();
        writeln!(output, "endmodule").unwrap();
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports_decoder() -> GeneratedDecoder {
        GeneratedDecoder {
            module_name: "enable_test".into(),
            package_name: "enable_test_pkg".into(),
            data_width: 32,
            addr_width: 5,
            parameters: vec![GeneratedParameter {
                name: "N_PORTS".into(),
                max: 8,
            }],
            units: vec![GeneratedUnit {
                ident: "port".into(),
                base: 0,
                size: 4,
                addr_width: 2,
                levels: vec![GeneratedLevel {
                    stride: 4,
                    count: 8,
                    bound: "N_PORTS".into(),
                }],
                gates: vec![],
            }],
            ports: vec![],
            local_addressing: true,
        }
    }

    #[test]
    fn test_package_constants() {
        let pkg = ports_decoder().generate_package();
        assert!(pkg.contains("package enable_test_pkg;"));
        assert!(pkg.contains("localparam ENABLE_TEST_MAX_N_PORTS = 8;"));
        assert!(pkg.contains("localparam ENABLE_TEST_DATA_WIDTH = 32;"));
        assert!(pkg.contains("localparam ENABLE_TEST_PORT_ADDR_WIDTH = 2;"));
    }

    #[test]
    fn test_parameters_and_assertions() {
        let d = ports_decoder();
        assert_eq!(d.generate_module_parameters(), vec!["parameter int N_PORTS = 8"]);
        let asserts = d.generate_parameter_assertions();
        assert!(asserts.contains("N_PORTS >= 0 && N_PORTS <= 8"));

        let module = d.generate_module();
        assert!(module.contains("module enable_test #("));
        assert!(module.contains("Parameter constraints"));
    }

    #[test]
    fn test_loop_bound_uses_parameter_and_struct_uses_max() {
        let d = ports_decoder();
        let logic = d.generate_decode_logic(Access::Read);
        assert!(logic.contains("i0 < N_PORTS"));
        assert!(logic.contains("cpuif_rd_sel.port[i0] = 1'b1;"));
        assert!(d.generate_select_struct().contains("logic port[8];"));
    }

    #[test]
    fn test_fanout_subtracts_element_base() {
        let d = ports_decoder();
        let fanout = d.generate_fanout_addresses();
        assert!(fanout.contains("logic [ENABLE_TEST_PORT_ADDR_WIDTH-1:0] port_addr[8];"));
        assert!(fanout.contains("for (genvar gi0 = 0; gi0 < 8; gi0++) begin : g_port_addr_0"));
        assert!(fanout.contains(
            "assign port_addr[gi0] = \
             ENABLE_TEST_PORT_ADDR_WIDTH'(cpuif_addr - 5'h0 - 5'(gi0*5'h4));"
        ));
        assert!(d.generate_module().contains("// Child addresses"));

        let mut full = ports_decoder();
        full.local_addressing = false;
        let fanout = full.generate_fanout_addresses();
        assert!(fanout.contains("logic [4:0] port_addr[8];"));
        assert!(fanout.contains("assign port_addr[gi0] = cpuif_addr;"));
    }

    #[test]
    fn test_static_decoder_has_no_constraints() {
        let mut d = ports_decoder();
        d.parameters.clear();
        d.units[0].levels[0].bound = "8".into();
        assert!(d.generate_parameter_assertions().is_empty());
        let module = d.generate_module();
        assert!(module.starts_with("module enable_test ("));
        assert!(!module.contains("Parameter constraints"));
        assert!(!d.generate_package().contains("_MAX_"));
    }
}
