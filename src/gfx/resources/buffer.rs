// src/gfx/resources/buffer.rs
//! Device buffers holding raw vertex or index bytes

use crate::gfx::device::{Backend, BufferKind, GraphicsContext, Handle, Result};

/// Exclusively owned GPU buffer.
///
/// The buffer is not `Clone`: one value owns one handle. [`destroy`]
/// consumes the value, so a buffer cannot be released twice or used after
/// it was released.
///
/// [`destroy`]: DeviceBuffer::destroy
#[derive(Debug)]
pub struct DeviceBuffer {
    handle: Handle,
    kind: BufferKind,
    len: usize,
}

impl DeviceBuffer {
    /// Allocates an empty buffer of the given kind.
    ///
    /// # Errors
    /// Fails with [`GfxError::NoDevice`] when the context has no device.
    ///
    /// [`GfxError::NoDevice`]: crate::gfx::device::GfxError::NoDevice
    pub fn new<B: Backend>(ctx: &mut GraphicsContext<B>, kind: BufferKind) -> Result<Self> {
        let handle = ctx.create_buffer(kind)?;
        Ok(Self {
            handle,
            kind,
            len: 0,
        })
    }

    /// Allocates a buffer and uploads `data` in one step.
    pub fn with_data<B: Backend, T: bytemuck::Pod>(
        ctx: &mut GraphicsContext<B>,
        kind: BufferKind,
        data: &[T],
    ) -> Result<Self> {
        let mut buffer = Self::new(ctx, kind)?;
        match buffer.upload_slice(ctx, data) {
            Ok(()) => Ok(buffer),
            Err(e) => {
                buffer.destroy(ctx);
                Err(e)
            }
        }
    }

    /// Replaces the whole payload with `bytes`.
    ///
    /// There are no partial updates: after this call the buffer holds exactly
    /// `bytes`, whatever it held before.
    ///
    /// # Errors
    /// An empty payload is rejected with [`GfxError::EmptyUpload`].
    ///
    /// [`GfxError::EmptyUpload`]: crate::gfx::device::GfxError::EmptyUpload
    pub fn upload<B: Backend>(&mut self, ctx: &mut GraphicsContext<B>, bytes: &[u8]) -> Result<()> {
        ctx.write_buffer(self.handle, bytes)?;
        self.len = bytes.len();
        Ok(())
    }

    /// Typed convenience over [`upload`](Self::upload).
    pub fn upload_slice<B: Backend, T: bytemuck::Pod>(
        &mut self,
        ctx: &mut GraphicsContext<B>,
        data: &[T],
    ) -> Result<()> {
        self.upload(ctx, bytemuck::cast_slice(data))
    }

    /// Makes this the active buffer of its kind.
    pub fn bind<B: Backend>(&self, ctx: &mut GraphicsContext<B>) {
        ctx.bind_buffer(self.kind, Some(self.handle));
    }

    /// Clears the active buffer of this kind.
    pub fn unbind<B: Backend>(&self, ctx: &mut GraphicsContext<B>) {
        ctx.bind_buffer(self.kind, None);
    }

    pub fn destroy<B: Backend>(self, ctx: &mut GraphicsContext<B>) {
        ctx.destroy_buffer(self.handle);
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    /// Byte length of the last upload.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::device::{GfxError, HeadlessBackend};

    fn context() -> GraphicsContext<HeadlessBackend> {
        GraphicsContext::new(HeadlessBackend::new())
    }

    #[test]
    fn test_upload_records_length() {
        let mut ctx = context();
        let mut buffer = DeviceBuffer::new(&mut ctx, BufferKind::Vertex).unwrap();
        assert!(buffer.is_empty());

        let payload: Vec<u8> = (0..96).collect();
        buffer.upload(&mut ctx, &payload).unwrap();
        assert_eq!(buffer.len(), 96);
        assert_eq!(ctx.backend().buffer_contents(buffer.handle()), Some(&payload[..]));

        buffer.destroy(&mut ctx);
    }

    #[test]
    fn test_reupload_fully_replaces_payload() {
        let mut ctx = context();
        let mut buffer = DeviceBuffer::new(&mut ctx, BufferKind::Vertex).unwrap();

        buffer.upload(&mut ctx, &[0xAA; 64]).unwrap();
        buffer.upload(&mut ctx, &[0x11; 16]).unwrap();
        assert_eq!(buffer.len(), 16);
        assert_eq!(
            ctx.backend().buffer_contents(buffer.handle()),
            Some(&[0x11; 16][..])
        );

        // Growing again must not resurrect any of the first payload.
        buffer.upload(&mut ctx, &[0x22; 64]).unwrap();
        let contents = ctx.backend().buffer_contents(buffer.handle()).unwrap();
        assert_eq!(contents.len(), 64);
        assert!(contents.iter().all(|b| *b == 0x22));

        buffer.destroy(&mut ctx);
    }

    #[test]
    fn test_empty_upload_is_rejected() {
        let mut ctx = context();
        let mut buffer = DeviceBuffer::new(&mut ctx, BufferKind::Index).unwrap();
        buffer.upload(&mut ctx, &[1, 2, 3, 4]).unwrap();

        assert!(matches!(
            buffer.upload(&mut ctx, &[]),
            Err(GfxError::EmptyUpload(_))
        ));
        assert_eq!(buffer.len(), 4);

        buffer.destroy(&mut ctx);

        // A failed initial upload leaves nothing behind
        assert!(DeviceBuffer::with_data::<_, f32>(&mut ctx, BufferKind::Vertex, &[]).is_err());
        assert_eq!(ctx.live_resources(), 0);
    }

    #[test]
    fn test_typed_upload() {
        let mut ctx = context();
        let indices: [u32; 6] = [0, 1, 2, 2, 3, 0];
        let buffer = DeviceBuffer::with_data(&mut ctx, BufferKind::Index, &indices).unwrap();
        assert_eq!(buffer.len(), 24);
        assert_eq!(
            ctx.backend().buffer_kind(buffer.handle()),
            Some(BufferKind::Index)
        );
        buffer.destroy(&mut ctx);
    }

    #[test]
    fn test_bind_and_unbind_track_active_target() {
        let mut ctx = context();
        let vertices = DeviceBuffer::new(&mut ctx, BufferKind::Vertex).unwrap();
        let indices = DeviceBuffer::new(&mut ctx, BufferKind::Index).unwrap();

        vertices.bind(&mut ctx);
        vertices.bind(&mut ctx);
        indices.bind(&mut ctx);
        assert_eq!(ctx.bindings().vertex_buffer, Some(vertices.handle()));
        assert_eq!(ctx.bindings().index_buffer, Some(indices.handle()));

        vertices.unbind(&mut ctx);
        assert_eq!(ctx.bindings().vertex_buffer, None);
        assert_eq!(ctx.bindings().index_buffer, Some(indices.handle()));

        vertices.destroy(&mut ctx);
        indices.destroy(&mut ctx);
    }

    #[test]
    fn test_destroy_releases_handle_and_binding() {
        let mut ctx = context();
        let buffer = DeviceBuffer::new(&mut ctx, BufferKind::Vertex).unwrap();
        let handle = buffer.handle();
        buffer.bind(&mut ctx);

        buffer.destroy(&mut ctx);
        assert_eq!(ctx.live_resources(), 0);
        assert_eq!(ctx.bindings().vertex_buffer, None);
        assert!(ctx.backend().buffer_contents(handle).is_none());
    }

    #[test]
    fn test_creation_without_device_fails() {
        let mut ctx = GraphicsContext::new(HeadlessBackend::without_device());
        assert!(matches!(
            DeviceBuffer::new(&mut ctx, BufferKind::Vertex),
            Err(GfxError::NoDevice(_))
        ));
    }
}
