//! Shader Loading Utilities
//!
//! Reads WGSL sources from the shader root at runtime and expands
//! `#import "file.wgsl"` directives against `<root>/common/`. Each import is
//! included once per program; nested imports are allowed.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{RenderError, Result};

/// Directory (relative to the shader root) searched by `#import`.
pub const COMMON_DIR: &str = "common";

const MAX_IMPORT_DEPTH: usize = 8;

/// WGSL text of one program with every import expanded.
#[derive(Clone, Debug)]
pub struct ShaderSource(String);

impl ShaderSource {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Read one WGSL file without expanding its imports.
pub fn load_shader_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    std::fs::read_to_string(path).map_err(|source| RenderError::ShaderIo {
        path: path.to_path_buf(),
        source,
    })
}

/// Load `file` from `root` and expand its imports.
pub fn load_program_source(root: &Path, file: &str) -> Result<ShaderSource> {
    let mut included = HashSet::new();
    let mut out = String::new();
    expand(root, &root.join(file), &mut included, &mut out, 0)?;
    Ok(ShaderSource(out))
}

/// Parse an import directive, returning the quoted file name.
fn parse_import(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix("#import")?;
    let rest = rest.trim();
    rest.strip_prefix('"')?.strip_suffix('"')
}

fn expand(
    root: &Path,
    path: &Path,
    included: &mut HashSet<PathBuf>,
    out: &mut String,
    depth: usize,
) -> Result<()> {
    let source = load_shader_file(path)?;

    for line in source.lines() {
        match parse_import(line) {
            Some(name) => {
                let import = root.join(COMMON_DIR).join(name);
                if depth >= MAX_IMPORT_DEPTH {
                    log::warn!(
                        "[ShaderLoader] import depth exceeded at {}, skipping {name}",
                        path.display()
                    );
                    continue;
                }
                if included.insert(import.clone()) {
                    expand(root, &import, included, out, depth + 1)?;
                }
            }
            None => {
                out.push_str(line);
                out.push('\n');
            }
        }
    }
    Ok(())
}

/// Create a wgpu shader module from the given source.
pub fn create_shader_module(
    device: &wgpu::Device,
    label: &str,
    source: &ShaderSource,
) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.as_str().into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lumen_shader_loader_{name}_{}", std::process::id()));
        std::fs::create_dir_all(dir.join(COMMON_DIR)).unwrap();
        dir
    }

    #[test]
    fn test_parse_import() {
        assert_eq!(parse_import("#import \"camera.wgsl\""), Some("camera.wgsl"));
        assert_eq!(parse_import("  #import   \"a.wgsl\"  "), Some("a.wgsl"));
        assert_eq!(parse_import("// #import \"a.wgsl\""), None);
        assert_eq!(parse_import("#import a.wgsl"), None);
    }

    #[test]
    fn test_imports_expand_once() {
        let dir = scratch_dir("once");
        std::fs::write(dir.join(COMMON_DIR).join("a.wgsl"), "const A: f32 = 1.0;\n").unwrap();
        std::fs::write(
            dir.join(COMMON_DIR).join("b.wgsl"),
            "#import \"a.wgsl\"\nconst B: f32 = A;\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("main.wgsl"),
            "#import \"a.wgsl\"\n#import \"b.wgsl\"\nconst C: f32 = B;\n",
        )
        .unwrap();

        let source = load_program_source(&dir, "main.wgsl").unwrap();
        assert_eq!(source.as_str().matches("const A").count(), 1);
        assert!(source.as_str().contains("const B"));
        assert!(!source.as_str().contains("#import"));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_missing_import_reports_path() {
        let dir = scratch_dir("missing");
        std::fs::write(dir.join("main.wgsl"), "#import \"nope.wgsl\"\n").unwrap();
        let err = load_program_source(&dir, "main.wgsl").err().unwrap();
        assert!(err.to_string().contains("nope.wgsl"));
        let _ = std::fs::remove_dir_all(dir);
    }
}
