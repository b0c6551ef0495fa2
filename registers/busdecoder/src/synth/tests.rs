// Licensed under the Apache-2.0 license

#[cfg(test)]
mod test {
    use super::super::{synthesize, synthesize_from_file, synthesize_with_registry};
    use crate::config::DecoderConfig;
    use crate::cpuif::{AdapterRegistry, CpuifAdapter};
    use crate::decode::Selection;
    use crate::error::{Severity, StructuralError};
    use crate::expr::Expr;
    use crate::types::{AddressMap, AddressMapBuilder, Dimension};

    fn flat() -> AddressMap {
        let mut b = AddressMapBuilder::new("flat_top");
        let root = b.root();
        for i in 0..4 {
            b.add_register(root, &format!("r{i}"), i * 4, 4);
        }
        b.build()
    }

    fn ports(n: u64) -> AddressMap {
        let mut b = AddressMapBuilder::new("enable_test");
        b.parameter("N_PORTS", n);
        let root = b.root();
        let port = b.add_register(root, "port", 0, 4);
        b.make_array(port, vec![Dimension::param(n, "N_PORTS")], None);
        b.build()
    }

    #[test]
    fn test_flat_defaults() {
        let s = synthesize(flat(), &DecoderConfig::new()).unwrap();
        assert_eq!(s.data_width, 32);
        assert_eq!(s.addr_width, 4);
        assert_eq!(s.module_name, "flat_top");
        assert_eq!(s.package_name, "flat_top_pkg");
        assert_eq!(s.adapter.name(), "apb4");
        assert!(s.parameters.is_static());

        let rt = s.runtime_params();
        assert_eq!(
            s.decode.lookup(0x8, &rt),
            Selection::Unit {
                entry: 2,
                indices: vec![]
            }
        );
        assert_eq!(s.decode.lookup(0x10, &rt), Selection::Default);
    }

    #[test]
    fn test_names_from_config() {
        let config = DecoderConfig::new()
            .module_name("my_decoder")
            .package_name("my_pkg");
        let s = synthesize(flat(), &config).unwrap();
        let module = s.render_module();
        assert!(module.starts_with("module my_decoder ("));
        assert!(module.contains("import my_pkg::*;"));
        assert!(s.render_package().starts_with("package my_pkg;"));
    }

    #[test]
    fn test_unknown_cpuif() {
        let err = synthesize(flat(), &DecoderConfig::new().cpuif("wishbone")).unwrap_err();
        assert_eq!(
            err,
            StructuralError::UnknownCpuif {
                name: "wishbone".into()
            }
        );
    }

    #[test]
    fn test_custom_registry_without_builtins() {
        let registry = AdapterRegistry::empty();
        assert!(synthesize_with_registry(flat(), &DecoderConfig::new(), &registry).is_err());
    }

    #[test]
    fn test_address_modifying_parameter() {
        let s = synthesize(ports(8), &DecoderConfig::new()).unwrap();
        let p = s.parameters.get("N_PORTS").unwrap();
        assert!(p.is_address_modifying());

        let generated = s.generated();
        assert_eq!(generated.parameters.len(), 1);
        assert_eq!(generated.parameters[0].max, 8);
        assert_eq!(generated.units[0].levels[0].count, 8);

        let module = s.render_module();
        assert!(module.contains("parameter int N_PORTS = 8"));
        assert!(module.contains("N_PORTS >= 0 && N_PORTS <= 8"));
        assert!(module.contains("i0 < N_PORTS"));
        assert!(module.contains("logic port[8];"));
        assert!(s
            .render_package()
            .contains("localparam ENABLE_TEST_MAX_N_PORTS = 8;"));
    }

    #[test]
    fn test_ambiguity_is_fatal_unless_allowed() {
        let mut b = AddressMapBuilder::new("top");
        b.parameter("A", 4u64).parameter("B", 4u64);
        let root = b.root();
        let r = b.add_register(root, "r", 0, 4);
        b.make_array(r, vec![Dimension::elaborated(4)], None);
        let map = b.build();

        let err = synthesize(map.clone(), &DecoderConfig::new()).unwrap_err();
        assert!(matches!(
            err,
            StructuralError::AmbiguousParameterClassification { .. }
        ));

        let s = synthesize(map, &DecoderConfig::new().allow_ambiguous_parameters(true)).unwrap();
        assert!(s.parameters.is_static());
        assert!(s
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Warning));
        // demoted parameters were not inert when classified
        assert!(!s.diagnostics.iter().any(|d| d.severity == Severity::Info));
        assert!(!s.render_module().contains("Parameter constraints"));
    }

    #[test]
    fn test_inert_parameter_renders_like_static() {
        let mut b = AddressMapBuilder::new("top");
        b.parameter("RESET_VAL", 0x1234u64);
        let root = b.root();
        let r = b.add_register(root, "r", 0, 4);
        b.node_mut(r)
            .property_exprs
            .insert("reset".into(), Expr::param("RESET_VAL"));
        let with_param = synthesize(b.build(), &DecoderConfig::new()).unwrap();

        let mut b = AddressMapBuilder::new("top");
        let root = b.root();
        b.add_register(root, "r", 0, 4);
        let plain = synthesize(b.build(), &DecoderConfig::new()).unwrap();

        assert!(!with_param.parameters.get("RESET_VAL").unwrap().is_address_modifying());
        assert_eq!(with_param.diagnostics.len(), 1);
        assert_eq!(with_param.diagnostics[0].severity, Severity::Info);
        assert_eq!(with_param.diagnostics[0].path, "RESET_VAL");
        assert!(plain.diagnostics.is_empty());
        assert_eq!(with_param.render_module(), plain.render_module());
        assert_eq!(with_param.render_package(), plain.render_package());
    }

    #[test]
    fn test_synthesis_is_idempotent() {
        let config = DecoderConfig::new().max_decode_depth(0);
        let a = synthesize(ports(4), &config).unwrap();
        let b = synthesize(ports(4), &config).unwrap();
        assert_eq!(a.decode, b.decode);
        assert_eq!(a.parameters, b.parameters);
        assert_eq!(a.render_module(), b.render_module());
    }

    #[test]
    fn test_write_outputs() {
        let s = synthesize(flat(), &DecoderConfig::new()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let written = s.write_outputs(dir.path()).unwrap();
        assert_eq!(written.len(), 2);
        assert!(written[0].ends_with("flat_top_pkg.sv"));
        let text = std::fs::read_to_string(&written[1]).unwrap();
        assert_eq!(text, s.render_module());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.toml");
        std::fs::write(
            &path,
            r#"
name = "file_top"

[[parameters]]
name = "N_PORTS"
value = 4

[[children]]
name = "port"
offset = 0
size = 4
dimensions = [{ value = 4, expr = "N_PORTS" }]
"#,
        )
        .unwrap();
        let s = synthesize_from_file(&path, &DecoderConfig::new()).unwrap();
        assert_eq!(s.module_name, "file_top");
        assert!(s.parameters.get("N_PORTS").unwrap().is_address_modifying());

        let missing = dir.path().join("missing.toml");
        assert!(synthesize_from_file(&missing, &DecoderConfig::new()).is_err());
    }
}
