//! CPU-side mesh data and mesh loaders

use serde::Deserialize;

use super::ResourceError;
use crate::render::Vertex;

/// Vertex and index lists ready for upload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    /// Vertices
    pub vertices: Vec<Vertex>,
    /// Triangle list indices into `vertices`
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Single triangle facing +Z
    pub fn triangle(color: [f32; 4]) -> Self {
        let normal = [0.0, 0.0, 1.0];
        Self {
            vertices: vec![
                Vertex::new([-0.5, -0.5, 0.0], normal, color, [0.0, 1.0]),
                Vertex::new([0.5, -0.5, 0.0], normal, color, [1.0, 1.0]),
                Vertex::new([0.0, 0.5, 0.0], normal, color, [0.5, 0.0]),
            ],
            indices: vec![0, 1, 2],
        }
    }

    /// Square in the XZ plane facing +Y with side length `size`
    pub fn plane(size: f32, color: [f32; 4]) -> Self {
        let h = size * 0.5;
        let normal = [0.0, 1.0, 0.0];
        Self {
            vertices: vec![
                Vertex::new([-h, 0.0, h], normal, color, [0.0, 1.0]),
                Vertex::new([h, 0.0, h], normal, color, [1.0, 1.0]),
                Vertex::new([h, 0.0, -h], normal, color, [1.0, 0.0]),
                Vertex::new([-h, 0.0, -h], normal, color, [0.0, 0.0]),
            ],
            indices: vec![0, 1, 2, 2, 3, 0],
        }
    }

    /// Axis-aligned cube centered at the origin with edge length `size`
    pub fn cube(size: f32, color: [f32; 4]) -> Self {
        let h = size * 0.5;
        // (normal, tangent u, tangent v) for each face, counter-clockwise seen from outside
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ];

        let mut mesh = Self::default();
        for (normal, u, v) in faces {
            let base = u32::try_from(mesh.vertices.len()).unwrap_or(u32::MAX);
            for (su, sv, uv) in [
                (-1.0, -1.0, [0.0, 1.0]),
                (1.0, -1.0, [1.0, 1.0]),
                (1.0, 1.0, [1.0, 0.0]),
                (-1.0, 1.0, [0.0, 0.0]),
            ] {
                let position = [
                    h * (normal[0] + su * u[0] + sv * v[0]),
                    h * (normal[1] + su * u[1] + sv * v[1]),
                    h * (normal[2] + su * u[2] + sv * v[2]),
                ];
                mesh.vertices.push(Vertex::new(position, normal, color, uv));
            }
            mesh.indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }
        mesh
    }
}

/// Decoder from raw resource bytes to [`MeshData`]
pub trait MeshLoader {
    /// Decode a mesh
    fn load(&self, bytes: &[u8]) -> Result<MeshData, ResourceError>;
}

/// Shapes understood by [`PrimitiveMeshLoader`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveShape {
    /// See [`MeshData::triangle`]
    Triangle,
    /// See [`MeshData::plane`]
    Plane,
    /// See [`MeshData::cube`]
    Cube,
}

#[derive(Debug, Deserialize)]
struct PrimitiveDescription {
    shape: PrimitiveShape,
    #[serde(default = "default_size")]
    size: f32,
    #[serde(default = "default_color")]
    color: [f32; 4],
}

const fn default_size() -> f32 {
    1.0
}

const fn default_color() -> [f32; 4] {
    [1.0, 1.0, 1.0, 1.0]
}

/// Builds generated shapes from a small TOML description
///
/// ```toml
/// shape = "cube"
/// size = 2.0
/// color = [1.0, 0.5, 0.0, 1.0]
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct PrimitiveMeshLoader;

impl PrimitiveMeshLoader {
    /// Name the loader is registered under
    pub const NAME: &'static str = "primitive";
}

impl MeshLoader for PrimitiveMeshLoader {
    fn load(&self, bytes: &[u8]) -> Result<MeshData, ResourceError> {
        let text = std::str::from_utf8(bytes).map_err(|e| ResourceError::Decode(e.to_string()))?;
        let description: PrimitiveDescription =
            toml::from_str(text).map_err(|e| ResourceError::Decode(e.to_string()))?;
        Ok(match description.shape {
            PrimitiveShape::Triangle => MeshData::triangle(description.color),
            PrimitiveShape::Plane => MeshData::plane(description.size, description.color),
            PrimitiveShape::Cube => MeshData::cube(description.size, description.color),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_normals_point_outwards() {
        let cube = MeshData::cube(2.0, [1.0; 4]);
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        for vertex in &cube.vertices {
            let outward: f32 = (0..3).map(|i| vertex.position[i] * vertex.normal[i]).sum();
            assert!((outward - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_cube_faces_wind_counter_clockwise() {
        let cube = MeshData::cube(1.0, [1.0; 4]);
        for triangle in cube.indices.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|i| cube.vertices[triangle[i] as usize]);
            let e1 = [0, 1, 2].map(|i| b.position[i] - a.position[i]);
            let e2 = [0, 1, 2].map(|i| c.position[i] - a.position[i]);
            let cross = [
                e1[1] * e2[2] - e1[2] * e2[1],
                e1[2] * e2[0] - e1[0] * e2[2],
                e1[0] * e2[1] - e1[1] * e2[0],
            ];
            let facing: f32 = (0..3).map(|i| cross[i] * a.normal[i]).sum();
            assert!(facing > 0.0);
        }
    }

    #[test]
    fn test_primitive_loader_reads_toml() {
        let mesh = PrimitiveMeshLoader
            .load(b"shape = \"plane\"\nsize = 4.0\ncolor = [0.0, 1.0, 0.0, 1.0]")
            .unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.vertices[1].position, [2.0, 0.0, 2.0]);
        assert_eq!(mesh.vertices[0].color, [0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_primitive_loader_rejects_unknown_shape() {
        assert!(PrimitiveMeshLoader.load(b"shape = \"teapot\"").is_err());
    }
}
