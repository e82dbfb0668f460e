use std::path::Path;

use cgmath::{EuclideanSpace, InnerSpace, Matrix, Matrix3, Matrix4, Rad, SquareMatrix, Vector3};

use crate::gfx::{
    camera::{camera_utils::projection_matrix, FlyCamera},
    device::{Backend, BufferKind, GraphicsContext, Result},
    geometry::generate_cube,
    resources::{AttributeBindingSet, DeviceBuffer, ShaderProgram},
    scene::vertex::Vertex3D,
};

pub const VERTEX_SHADER: &str = "vertex.wgsl";
pub const OBJECT_SHADER: &str = "object.wgsl";
pub const LIGHT_SHADER: &str = "light.wgsl";

/// Lighting and colour values edited by the UI and read by the renderer.
///
/// Colours are linear RGB in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneParameters {
    pub sky_color: [f32; 3],
    pub ground_color: [f32; 3],
    pub light_color: [f32; 3],
    pub light_position: [f32; 3],
    pub ambient_strength: f32,
    pub specular_strength: f32,
    /// Specular exponent
    pub reflectivity: i32,
}

impl Default for SceneParameters {
    fn default() -> Self {
        Self {
            sky_color: [0.53, 0.8, 0.92],
            ground_color: [0.1, 0.6, 0.1],
            light_color: [1.0, 1.0, 1.0],
            light_position: [0.0, 30.0, -100.0],
            ambient_strength: 0.80,
            specular_strength: 0.25,
            reflectivity: 8,
        }
    }
}

impl SceneParameters {
    pub fn clear_color(&self) -> wgpu::Color {
        let [r, g, b] = self.sky_color;
        wgpu::Color {
            r: r as f64,
            g: g as f64,
            b: b as f64,
            a: 1.0,
        }
    }

    /// Model matrix of the light indicator cube.
    pub fn light_model(&self) -> Matrix4<f32> {
        Matrix4::from_translation(Vector3::from(self.light_position))
            * Matrix4::from_scale(4.0)
            * Matrix4::from_axis_angle(Vector3::new(1.0, 1.0, 1.0).normalize(), Rad(45.0))
    }
}

/// Upper 3x3 of the inverse transpose, for transforming normals.
pub fn normal_matrix(model: Matrix4<f32>) -> Matrix3<f32> {
    let inverse_transpose = model
        .invert()
        .map(|inverse| inverse.transpose())
        .unwrap_or_else(|| {
            log::warn!("model matrix is singular; normals left untransformed");
            Matrix4::identity()
        });
    Matrix3::from_cols(
        inverse_transpose.x.truncate(),
        inverse_transpose.y.truncate(),
        inverse_transpose.z.truncate(),
    )
}

/// The ground model: a unit cube flattened into a 110 x 110 slab below the camera.
pub fn ground_model() -> Matrix4<f32> {
    Matrix4::from_translation(Vector3::new(0.0, -2.0, 0.0))
        * Matrix4::from_nonuniform_scale(110.0, 1.0, 110.0)
}

/// Per-frame orchestration of the lit ground and the light indicator.
///
/// Both draws share one cube mesh; each has its own binding set and program.
#[derive(Debug)]
pub struct Scene {
    object_program: ShaderProgram,
    light_program: ShaderProgram,
    vertices: DeviceBuffer,
    indices: DeviceBuffer,
    object_set: AttributeBindingSet,
    light_set: AttributeBindingSet,
    index_count: u32,
    ground_model: Matrix4<f32>,
    znear: f32,
    zfar: f32,
}

impl Scene {
    /// Loads the shaders from `shader_dir` and uploads the cube.
    ///
    /// # Errors
    /// Missing or invalid shader files and device failures; all are fatal at
    /// startup.
    pub fn new<B: Backend>(ctx: &mut GraphicsContext<B>, shader_dir: &Path) -> Result<Self> {
        let vertex = shader_dir.join(VERTEX_SHADER);
        let object_program =
            ShaderProgram::from_files(ctx, &vertex, shader_dir.join(OBJECT_SHADER))?;
        let light_program =
            match ShaderProgram::from_files(ctx, &vertex, shader_dir.join(LIGHT_SHADER)) {
                Ok(program) => program,
                Err(e) => {
                    object_program.destroy(ctx);
                    return Err(e);
                }
            };
        Self::with_programs(ctx, object_program, light_program)
    }

    /// Like [`new`](Self::new) with the stage sources given in memory.
    pub fn from_sources<B: Backend>(
        ctx: &mut GraphicsContext<B>,
        vertex: &str,
        object_fragment: &str,
        light_fragment: &str,
    ) -> Result<Self> {
        let object_program = ShaderProgram::new(ctx, vertex, object_fragment)?;
        let light_program = match ShaderProgram::new(ctx, vertex, light_fragment) {
            Ok(program) => program,
            Err(e) => {
                object_program.destroy(ctx);
                return Err(e);
            }
        };
        Self::with_programs(ctx, object_program, light_program)
    }

    /// Takes ownership of both programs; they are released if the mesh
    /// cannot be built.
    fn with_programs<B: Backend>(
        ctx: &mut GraphicsContext<B>,
        object_program: ShaderProgram,
        light_program: ShaderProgram,
    ) -> Result<Self> {
        let mesh = match CubeMesh::new(ctx) {
            Ok(mesh) => mesh,
            Err(e) => {
                object_program.destroy(ctx);
                light_program.destroy(ctx);
                return Err(e);
            }
        };

        log::info!("scene ready: {} cube indices", mesh.index_count);
        Ok(Self {
            object_program,
            light_program,
            vertices: mesh.vertices,
            indices: mesh.indices,
            object_set: mesh.object_set,
            light_set: mesh.light_set,
            index_count: mesh.index_count,
            ground_model: ground_model(),
            znear: 0.1,
            zfar: 150.0,
        })
    }

    pub fn with_clip_planes(mut self, znear: f32, zfar: f32) -> Self {
        self.znear = znear;
        self.zfar = zfar;
        self
    }

    /// Pushes this frame's uniforms and issues both draws.
    pub fn render<B: Backend>(
        &mut self,
        ctx: &mut GraphicsContext<B>,
        camera: &FlyCamera,
        params: &SceneParameters,
        aspect: f32,
    ) -> Result<()> {
        let view = camera.view_matrix();
        let projection = projection_matrix(camera.zoom(), aspect, self.znear, self.zfar);
        let light_color = Vector3::from(params.light_color);

        let program = &mut self.object_program;
        program.activate(ctx);
        program.set_uniform(ctx, "objectColor", Vector3::from(params.ground_color));
        program.set_uniform(ctx, "lightColor", light_color);
        program.set_uniform(ctx, "lightPos", Vector3::from(params.light_position));
        program.set_uniform(ctx, "viewPos", camera.position.to_vec());
        program.set_uniform(ctx, "ambientStrength", params.ambient_strength);
        program.set_uniform(ctx, "specularStrength", params.specular_strength);
        program.set_uniform(ctx, "reflectivity", params.reflectivity);
        program.set_uniform(ctx, "view", view);
        program.set_uniform(ctx, "projection", projection);
        program.set_uniform(ctx, "model", self.ground_model);
        program.set_uniform(ctx, "normalMatrix", normal_matrix(self.ground_model));
        self.object_set.bind(ctx);
        ctx.draw_indexed(self.index_count)?;

        let light_model = params.light_model();
        let program = &mut self.light_program;
        program.activate(ctx);
        program.set_uniform(ctx, "view", view);
        program.set_uniform(ctx, "projection", projection);
        program.set_uniform(ctx, "model", light_model);
        program.set_uniform(ctx, "normalMatrix", normal_matrix(light_model));
        program.set_uniform(ctx, "lightColor", light_color);
        self.light_set.bind(ctx);
        ctx.draw_indexed(self.index_count)?;

        self.light_set.unbind(ctx);
        Ok(())
    }

    /// Releases every device resource exactly once.
    pub fn destroy<B: Backend>(self, ctx: &mut GraphicsContext<B>) {
        self.object_set.destroy(ctx);
        self.light_set.destroy(ctx);
        self.vertices.destroy(ctx);
        self.indices.destroy(ctx);
        self.object_program.destroy(ctx);
        self.light_program.destroy(ctx);
    }
}

/// The uploaded cube and one binding set per draw.
struct CubeMesh {
    vertices: DeviceBuffer,
    indices: DeviceBuffer,
    object_set: AttributeBindingSet,
    light_set: AttributeBindingSet,
    index_count: u32,
}

impl CubeMesh {
    /// On failure everything created so far is destroyed again.
    fn new<B: Backend>(ctx: &mut GraphicsContext<B>) -> Result<Self> {
        let cube = generate_cube();
        log::debug!(
            "uploading cube: {} vertices, {} indices",
            cube.vertex_count(),
            cube.index_count()
        );
        let vertices = DeviceBuffer::with_data(ctx, BufferKind::Vertex, &cube.vertices)?;
        let indices = match DeviceBuffer::with_data(ctx, BufferKind::Index, &cube.indices) {
            Ok(indices) => indices,
            Err(e) => {
                vertices.destroy(ctx);
                return Err(e);
            }
        };

        let sets = linked_set(ctx, &vertices, &indices).and_then(|object_set| {
            match linked_set(ctx, &vertices, &indices) {
                Ok(light_set) => Ok((object_set, light_set)),
                Err(e) => {
                    object_set.destroy(ctx);
                    Err(e)
                }
            }
        });
        match sets {
            Ok((object_set, light_set)) => Ok(Self {
                vertices,
                indices,
                object_set,
                light_set,
                index_count: cube.index_count(),
            }),
            Err(e) => {
                vertices.destroy(ctx);
                indices.destroy(ctx);
                Err(e)
            }
        }
    }
}

/// A new binding set describing the cube, or nothing if linking fails.
fn linked_set<B: Backend>(
    ctx: &mut GraphicsContext<B>,
    vertices: &DeviceBuffer,
    indices: &DeviceBuffer,
) -> Result<AttributeBindingSet> {
    let set = AttributeBindingSet::new(ctx)?;
    if let Err(e) = link_mesh(ctx, &set, vertices, indices) {
        set.destroy(ctx);
        return Err(e);
    }
    Ok(set)
}

/// Describes the interleaved cube layout in `set` and captures `indices`.
fn link_mesh<B: Backend>(
    ctx: &mut GraphicsContext<B>,
    set: &AttributeBindingSet,
    vertices: &DeviceBuffer,
    indices: &DeviceBuffer,
) -> Result<()> {
    set.bind(ctx);
    vertices.bind(ctx);
    indices.bind(ctx);
    for layout in Vertex3D::layouts() {
        set.link_attribute(ctx, vertices, layout)?;
    }
    set.unbind(ctx);
    vertices.unbind(ctx);
    indices.unbind(ctx);
    Ok(())
}
