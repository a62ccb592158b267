//! Shared-memory buffer provider: a memfd-backed, zero-filled ARGB8888 buffer.

use std::ffi::CStr;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::ptr::NonNull;

use tracing::{debug, info, warn};
use wayland_client::{
    QueueHandle,
    protocol::{wl_buffer::WlBuffer, wl_shm},
};

use crate::error::{OverlayError, Result};
use crate::wayland_overlay::OverlayState;

pub const BYTES_PER_PIXEL: u32 = 4;

/// One transparent texel, stretched by the compositor across the anchored area.
pub const OVERLAY_WIDTH: u32 = 1;
pub const OVERLAY_HEIGHT: u32 = 1;

const MEMFD_NAME: &CStr = c"idle-blur-overlay";

/// Geometry of a tightly packed 32-bit buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelLayout {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub size: usize,
}

impl PixelLayout {
    pub fn argb8888(width: u32, height: u32) -> Result<Self> {
        let overflow = || OverlayError::Allocation {
            context: "buffer dimensions",
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{}x{} buffer does not fit a shm pool", width, height),
            ),
        };

        if width == 0 || height == 0 {
            return Err(overflow());
        }
        let stride = width.checked_mul(BYTES_PER_PIXEL).ok_or_else(overflow)?;
        let size = stride.checked_mul(height).ok_or_else(overflow)?;
        // The protocol carries sizes and strides as i32.
        i32::try_from(size).map_err(|_| overflow())?;

        Ok(Self {
            width,
            height,
            stride,
            size: size as usize,
        })
    }

    pub fn overlay() -> Result<Self> {
        Self::argb8888(OVERLAY_WIDTH, OVERLAY_HEIGHT)
    }
}

/// A shared, read/write mapping of a memfd. Unmapped on drop.
#[derive(Debug)]
pub struct ShmMapping {
    ptr: NonNull<u8>,
    len: usize,
}

impl ShmMapping {
    fn map(fd: BorrowedFd<'_>, len: usize) -> Result<Self> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(OverlayError::last_os("mmap"));
        }
        let ptr = NonNull::new(ptr.cast::<u8>()).ok_or_else(|| OverlayError::last_os("mmap"))?;
        Ok(Self { ptr, len })
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    fn fill_transparent(&mut self) {
        // ARGB8888 zero is alpha 0 with zero colour channels.
        unsafe { std::ptr::write_bytes(self.ptr.as_ptr(), 0, self.len) };
    }
}

impl Drop for ShmMapping {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast(), self.len);
        }
        debug!("Unmapped shared memory ({} bytes)", self.len);
    }
}

/// Creates a close-on-exec, sealable memfd of exactly `layout.size` bytes, maps it and
/// zero-fills it. The caller decides when to close the fd; the mapping stays valid
/// after it is closed.
pub fn transparent_region(layout: &PixelLayout) -> Result<(OwnedFd, ShmMapping)> {
    let raw = unsafe {
        libc::memfd_create(
            MEMFD_NAME.as_ptr(),
            libc::MFD_CLOEXEC | libc::MFD_ALLOW_SEALING,
        )
    };
    if raw < 0 {
        return Err(OverlayError::last_os("memfd_create"));
    }
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };

    if unsafe { libc::ftruncate(fd.as_raw_fd(), layout.size as libc::off_t) } < 0 {
        return Err(OverlayError::last_os("ftruncate"));
    }

    // The compositor maps this too; a shrink under it would SIGBUS the server.
    let seals = libc::F_SEAL_SHRINK | libc::F_SEAL_GROW;
    if unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_ADD_SEALS, seals) } < 0 {
        warn!(
            "Could not seal shared memory: {}",
            std::io::Error::last_os_error()
        );
    }

    let mut mapping = ShmMapping::map(fd.as_fd(), layout.size)?;
    mapping.fill_transparent();

    debug!(
        "Created shared memory fd {} for {} bytes",
        fd.as_raw_fd(),
        layout.size
    );
    Ok((fd, mapping))
}

/// The attached buffer object and the memory behind it.
pub struct TransparentBuffer {
    pub buffer: WlBuffer,
    pub mapping: ShmMapping,
    pub layout: PixelLayout,
}

/// Builds the overlay's single buffer. The pool is destroyed and the fd closed before
/// returning; only the buffer object and the mapping survive.
pub fn build_transparent_buffer(
    shm: &wl_shm::WlShm,
    qh: &QueueHandle<OverlayState>,
    layout: PixelLayout,
) -> Result<TransparentBuffer> {
    let (fd, mapping) = transparent_region(&layout)?;

    let pool = shm.create_pool(fd.as_fd(), layout.size as i32, qh, ());
    let buffer = pool.create_buffer(
        0,
        layout.width as i32,
        layout.height as i32,
        layout.stride as i32,
        wl_shm::Format::Argb8888,
        qh,
        (),
    );
    pool.destroy();
    drop(fd);

    info!(
        "Created {}x{} transparent ARGB8888 buffer ({} bytes)",
        layout.width, layout.height, layout.size
    );

    Ok(TransparentBuffer {
        buffer,
        mapping,
        layout,
    })
}
