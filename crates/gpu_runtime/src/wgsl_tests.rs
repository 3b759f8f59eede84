use crate::ComputeShader;

#[test]
fn compute_shaders_parse_and_validate() {
    for shader in ComputeShader::ALL {
        validate_wgsl(shader.label(), shader.source());
    }
}

#[test]
fn compute_shaders_declare_their_layout_bindings() {
    for shader in ComputeShader::ALL {
        let module = parse_wgsl(shader.label(), shader.source());
        let mut declared: Vec<u32> = module
            .global_variables
            .iter()
            .filter_map(|(_, variable)| variable.binding.as_ref())
            .map(|binding| {
                assert_eq!(binding.group, 0, "{} binds outside group 0", shader.label());
                binding.binding
            })
            .collect();
        declared.sort_unstable();
        let expected: Vec<u32> = shader
            .layout_entries()
            .iter()
            .map(|entry| entry.binding)
            .collect();
        assert_eq!(declared, expected, "binding mismatch in {}", shader.label());
    }
}

#[test]
fn compute_shaders_match_declared_workgroup_size() {
    for shader in ComputeShader::ALL {
        let module = parse_wgsl(shader.label(), shader.source());
        let entry = module
            .entry_points
            .iter()
            .find(|entry| entry.name == "main")
            .unwrap_or_else(|| panic!("{} has no main entry point", shader.label()));
        assert_eq!(entry.workgroup_size, shader.workgroup_size(), "{}", shader.label());
    }
}

fn parse_wgsl(label: &str, source: &str) -> naga::Module {
    naga::front::wgsl::parse_str(source).unwrap_or_else(|error| {
        panic!(
            "WGSL parse failed for {label}: {}",
            error.emit_to_string(source)
        )
    })
}

fn validate_wgsl(label: &str, source: &str) {
    let module = parse_wgsl(label, source);
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .unwrap_or_else(|error| {
        panic!(
            "WGSL validation failed for {label}: {}",
            error.emit_to_string(source)
        )
    });
}
