//! Shader Tests - WGSL Program Validation
//!
//! Expands every program's imports and runs it through naga's parser and
//! validator, so shader errors show up in `cargo test` rather than at
//! pipeline creation.

use std::collections::BTreeSet;
use std::path::PathBuf;

use lumen_engine::render::{load_program_source, ProgramKind};

fn shader_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("shaders")
}

fn parse(kind: ProgramKind) -> naga::Module {
    let source = load_program_source(&shader_root(), &kind.file_name())
        .unwrap_or_else(|err| panic!("{}: {err}", kind.name()));
    naga::front::wgsl::parse_str(source.as_str())
        .unwrap_or_else(|err| panic!("{}: {}", kind.name(), err.emit_to_string(source.as_str())))
}

fn bound_groups(module: &naga::Module) -> BTreeSet<u32> {
    module
        .global_variables
        .iter()
        .filter_map(|(_, var)| var.binding.as_ref().map(|b| b.group))
        .collect()
}

// ============================================================================
// Parsing and Validation
// ============================================================================

#[test]
fn test_every_program_validates() {
    for kind in ProgramKind::ALL {
        let module = parse(kind);
        let mut validator =
            naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all());
        if let Err(err) = validator.validate(&module) {
            panic!("{} failed validation: {err:?}", kind.name());
        }
    }
}

#[test]
fn test_entry_points_match_program_stages() {
    for kind in ProgramKind::ALL {
        let module = parse(kind);
        let stages: Vec<(&str, naga::ShaderStage)> = module
            .entry_points
            .iter()
            .map(|ep| (ep.name.as_str(), ep.stage))
            .collect();
        assert!(
            stages.contains(&("vs_main", naga::ShaderStage::Vertex)),
            "{} has no vs_main",
            kind.name()
        );
        let has_fs = stages.contains(&("fs_main", naga::ShaderStage::Fragment));
        assert_eq!(has_fs, kind.has_fragment(), "{} fragment stage", kind.name());
    }
}

/// Whether any function `textureLoad`s from a depth texture. GLSL maps
/// depth textures to shadow samplers, which only support comparison.
fn loads_from_depth_textures(module: &naga::Module, info: &naga::valid::ModuleInfo) -> bool {
    let is_depth_load = |function: &naga::Function, function_info: &naga::valid::FunctionInfo| {
        function.expressions.iter().any(|(_, expr)| match *expr {
            naga::Expression::ImageLoad { image, .. } => matches!(
                function_info[image].ty.inner_with(&module.types),
                naga::TypeInner::Image { class: naga::ImageClass::Depth { .. }, .. }
            ),
            _ => false,
        })
    };
    let in_functions = module
        .functions
        .iter()
        .any(|(handle, function)| is_depth_load(function, &info[handle]));
    let in_entry_points = module
        .entry_points
        .iter()
        .enumerate()
        .any(|(i, ep)| is_depth_load(&ep.function, info.get_entry_point(i)));
    in_functions || in_entry_points
}

#[test]
fn test_no_program_loads_texels_from_depth_textures() {
    for kind in ProgramKind::ALL {
        let module = parse(kind);
        let info = naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all())
            .validate(&module)
            .unwrap_or_else(|err| panic!("{} failed validation: {err:?}", kind.name()));
        assert!(
            !loads_from_depth_textures(&module, &info),
            "{} loads texels from a depth texture",
            kind.name()
        );
    }
}

// ============================================================================
// Bind Group Usage
// ============================================================================

#[test]
fn test_programs_only_bind_groups_their_layout_provides() {
    for kind in ProgramKind::ALL {
        let groups = bound_groups(&parse(kind));
        let allowed: &[u32] = match kind {
            ProgramKind::BrdfLut => &[],
            ProgramKind::ShadowDirectional | ProgramKind::ShadowPoint => &[0, 1],
            ProgramKind::EquirectToCube | ProgramKind::Irradiance | ProgramKind::Prefilter => &[0, 1, 3],
            _ => &[0, 1, 2, 3],
        };
        for group in &groups {
            assert!(allowed.contains(group), "{} binds group {group}", kind.name());
        }
    }
}

#[test]
fn test_material_programs_read_the_material_block() {
    for kind in ProgramKind::ALL.into_iter().filter(|k| k.uses_mesh() && k.has_fragment()) {
        if matches!(kind, ProgramKind::ShadowPoint) {
            continue;
        }
        let module = parse(kind);
        let has_material = module
            .global_variables
            .iter()
            .any(|(_, var)| var.name.as_deref() == Some("material"));
        assert!(has_material, "{} does not declare the material block", kind.name());
    }
}

// ============================================================================
// Import Expansion
// ============================================================================

#[test]
fn test_shared_imports_are_included_once() {
    // forward_pbr reaches constants.wgsl through both mesh.wgsl and lighting.wgsl
    let source = load_program_source(&shader_root(), &ProgramKind::ForwardPbr.file_name()).unwrap();
    let declarations = source.as_str().matches("const PI:").count();
    assert_eq!(declarations, 1);
    assert!(!source.as_str().contains("#import"));
}
