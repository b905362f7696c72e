//! Default GLSL 330 sources for every vertex layout, embedded at build time.
//!
//! Each layout's shader lives in `shaders/<name>/{vert,frag}.glsl` and follows the default
//! [`GlConfig`](crate::config::GlConfig) names.

use include_dir::{Dir, include_dir};

static SHADERS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/shaders");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderSources {
    pub vertex: &'static str,
    pub fragment: &'static str,
}

/// Looks up the sources of a built-in shader, e.g. `"color"` or `"skinned"`.
pub fn sources(name: &str) -> Option<ShaderSources> {
    let stage = |file: &str| {
        SHADERS
            .get_file(format!("{name}/{file}"))
            .and_then(|f| f.contents_utf8())
    };
    Some(ShaderSources {
        vertex: stage("vert.glsl")?,
        fragment: stage("frag.glsl")?,
    })
}

/// Inserts `#define {name} {value}` right after the `#version` line, or at the top when the
/// source has none.
pub fn with_define(source: &str, name: &str, value: impl std::fmt::Display) -> String {
    let define = format!("#define {name} {value}\n");
    match source.split_once('\n') {
        Some((first, rest)) if first.trim_start().starts_with("#version") => {
            format!("{first}\n{define}{rest}")
        }
        _ => format!("{define}{source}"),
    }
}

/// Names of all built-in shaders.
pub fn names() -> impl Iterator<Item = &'static str> {
    SHADERS
        .dirs()
        .filter_map(|dir| dir.path().file_name()?.to_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::vertex::{ColorVertex, ColoredTexturedVertex, SkinnedVertex, TexturedVertex, Vertex};

    #[test]
    fn test_every_layout_has_sources() {
        for name in [
            ColorVertex::BUILTIN,
            TexturedVertex::BUILTIN,
            ColoredTexturedVertex::BUILTIN,
            SkinnedVertex::BUILTIN,
        ] {
            let sources = sources(name).unwrap();
            assert!(sources.vertex.starts_with("#version 330 core"), "{name}");
            assert!(sources.fragment.contains("void main"), "{name}");
        }
        assert_eq!(names().count(), 4);
    }

    #[test]
    fn test_define_follows_version() {
        let source = with_define("#version 330 core\nvoid main() {}\n", "MAX_BONES", 4);
        assert_eq!(source, "#version 330 core\n#define MAX_BONES 4\nvoid main() {}\n");

        let source = with_define("void main() {}", "MAX_BONES", 16);
        assert!(source.starts_with("#define MAX_BONES 16\n"));
    }

    #[test]
    fn test_unknown_name() {
        assert!(sources("wireframe").is_none());
        assert!(sources("").is_none());
    }
}
