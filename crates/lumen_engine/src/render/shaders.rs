//! Shader preprocessor defines and the engine's built-in shader programs

use std::collections::BTreeMap;
use std::fmt::Display;

use super::types::{ShaderSource, UniformField};

/// Preprocessor defines prepended to every GLSL source a backend compiles
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderDefines {
    defines: BTreeMap<String, String>,
}

impl ShaderDefines {
    /// Set or replace a define
    pub fn set(&mut self, name: &str, value: impl Display) {
        self.defines.insert(name.to_string(), value.to_string());
    }

    /// Value of a define
    pub fn get(&self, name: &str) -> Option<&str> {
        self.defines.get(name).map(String::as_str)
    }

    /// Remove a define
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.defines.remove(name)
    }

    /// Number of defines
    pub fn len(&self) -> usize {
        self.defines.len()
    }

    /// Whether no defines are set
    pub fn is_empty(&self) -> bool {
        self.defines.is_empty()
    }

    /// Insert the defines into `source`, after its `#version` line if it has one
    pub fn apply(&self, source: &str) -> String {
        if self.defines.is_empty() {
            return source.to_string();
        }
        let block: String = self
            .defines
            .iter()
            .map(|(name, value)| format!("#define {name} {value}\n"))
            .collect();

        let trimmed = source.trim_start();
        if trimmed.starts_with("#version") {
            let (version, rest) = trimmed.split_once('\n').unwrap_or((trimmed, ""));
            format!("{version}\n{block}{rest}")
        } else {
            format!("{block}{source}")
        }
    }
}

/// Shader programs the engine itself draws with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinShader {
    /// Textured, vertex-colored UI triangles in screen points
    Ui,
    /// Lit, tinted meshes using the per-frame camera block
    Basic,
}

/// Source form a backend consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderForm {
    /// GLSL text
    Glsl,
    /// Precompiled SPIR-V
    SpirV,
}

const UI_VERTEX_GLSL: &str = r"#version 330 core
layout(location = 0) in vec3 a_position;
layout(location = 2) in vec4 a_color;
layout(location = 3) in vec2 a_uv;

uniform vec2 u_screen_size;

out vec4 v_color;
out vec2 v_uv;

void main() {
    gl_Position = vec4(
        2.0 * a_position.x / u_screen_size.x - 1.0,
        1.0 - 2.0 * a_position.y / u_screen_size.y,
        0.0,
        1.0);
    v_color = a_color;
    v_uv = a_uv;
}
";

const UI_FRAGMENT_GLSL: &str = r"#version 330 core
in vec4 v_color;
in vec2 v_uv;

uniform sampler2D u_texture;

out vec4 frag_color;

void main() {
    frag_color = v_color * texture(u_texture, v_uv);
}
";

const BASIC_VERTEX_GLSL: &str = r"#version 330 core
layout(location = 0) in vec3 a_position;
layout(location = 1) in vec3 a_normal;
layout(location = 2) in vec4 a_color;
layout(location = 3) in vec2 a_uv;

layout(std140) uniform UboPV {
    mat4 projection;
    mat4 view;
};

uniform mat4 u_model;
uniform vec4 u_tint;

out vec3 v_normal;
out vec4 v_color;
out vec2 v_uv;

void main() {
    gl_Position = projection * view * u_model * vec4(a_position, 1.0);
    v_normal = mat3(u_model) * a_normal;
    v_color = a_color * u_tint;
    v_uv = a_uv;
}
";

const BASIC_FRAGMENT_GLSL: &str = r"#version 330 core
in vec3 v_normal;
in vec4 v_color;
in vec2 v_uv;

uniform sampler2D u_texture;

out vec4 frag_color;

void main() {
    vec3 light_dir = normalize(vec3(0.4, 1.0, 0.6));
    float diffuse = max(dot(normalize(v_normal), light_dir), 0.0);
    vec4 base = v_color * texture(u_texture, v_uv);
    frag_color = vec4(base.rgb * (0.25 + 0.75 * diffuse), base.a);
}
";

impl BuiltinShader {
    /// Source of the program in the requested form
    ///
    /// SPIR-V is only available when the build compiled the shaders.
    pub fn source(self, form: ShaderForm) -> Option<ShaderSource> {
        match form {
            ShaderForm::Glsl => {
                let (vertex, fragment) = match self {
                    Self::Ui => (UI_VERTEX_GLSL, UI_FRAGMENT_GLSL),
                    Self::Basic => (BASIC_VERTEX_GLSL, BASIC_FRAGMENT_GLSL),
                };
                Some(ShaderSource::Glsl {
                    vertex: vertex.to_string(),
                    fragment: fragment.to_string(),
                })
            }
            ShaderForm::SpirV => self.spirv(),
        }
    }

    /// Push-constant layout of the SPIR-V program
    pub fn uniforms(self) -> Vec<UniformField> {
        match self {
            Self::Ui => vec![UniformField::new("u_screen_size", 0, 8)],
            Self::Basic => vec![
                UniformField::new("u_model", 0, 64),
                UniformField::new("u_tint", 64, 16),
            ],
        }
    }

    #[cfg(lumen_spirv)]
    fn spirv(self) -> Option<ShaderSource> {
        let (vertex, fragment): (&[u8], &[u8]) = match self {
            Self::Ui => (
                include_bytes!(concat!(env!("OUT_DIR"), "/ui.vert.spv")),
                include_bytes!(concat!(env!("OUT_DIR"), "/ui.frag.spv")),
            ),
            Self::Basic => (
                include_bytes!(concat!(env!("OUT_DIR"), "/basic.vert.spv")),
                include_bytes!(concat!(env!("OUT_DIR"), "/basic.frag.spv")),
            ),
        };
        let decode = |bytes: &[u8]| ash::util::read_spv(&mut std::io::Cursor::new(bytes));
        match (decode(vertex), decode(fragment)) {
            (Ok(vertex), Ok(fragment)) => Some(ShaderSource::SpirV {
                vertex,
                fragment,
                uniforms: self.uniforms(),
            }),
            (Err(e), _) | (_, Err(e)) => {
                log::error!("Built-in {self:?} SPIR-V is corrupt: {e}");
                None
            }
        }
    }

    #[cfg(not(lumen_spirv))]
    fn spirv(self) -> Option<ShaderSource> {
        log::error!("Built-in {self:?} shader was not compiled to SPIR-V; set VULKAN_SDK and rebuild");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defines_follow_version_line() {
        let mut defines = ShaderDefines::default();
        defines.set("MAX_POINT_LIGHTS", 64);
        let out = defines.apply("#version 330 core\nvoid main() {}\n");
        assert_eq!(out, "#version 330 core\n#define MAX_POINT_LIGHTS 64\nvoid main() {}\n");
    }

    #[test]
    fn test_defines_prepend_without_version() {
        let mut defines = ShaderDefines::default();
        defines.set("A", 1);
        defines.set("B", "two");
        assert_eq!(defines.apply("x"), "#define A 1\n#define B two\nx");
    }

    #[test]
    fn test_glsl_builtins_always_exist() {
        for shader in [BuiltinShader::Ui, BuiltinShader::Basic] {
            assert!(matches!(
                shader.source(ShaderForm::Glsl),
                Some(ShaderSource::Glsl { .. })
            ));
        }
    }

    #[test]
    fn test_uniform_layouts_do_not_overlap() {
        let fields = BuiltinShader::Basic.uniforms();
        assert_eq!(fields[0].offset + fields[0].size, fields[1].offset);
    }
}
