/// Pixel format of a constant image payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum ImageFormat {
    /// Single 8-bit luminance channel.
    L8,
    /// Interleaved 8-bit RGB.
    Rgb8,
    /// Interleaved 8-bit RGBA.
    #[default]
    Rgba8,
}

impl ImageFormat {
    /// Bytes per pixel for this format.
    pub fn pixel_size(self) -> usize {
        match self {
            ImageFormat::L8 => 1,
            ImageFormat::Rgb8 => 3,
            ImageFormat::Rgba8 => 4,
        }
    }

    /// Stable byte tag used in archives and bytecode.
    pub(crate) fn code(self) -> u8 {
        match self {
            ImageFormat::L8 => 0,
            ImageFormat::Rgb8 => 1,
            ImageFormat::Rgba8 => 2,
        }
    }

    /// Inverse of [`ImageFormat::code`].
    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ImageFormat::L8),
            1 => Some(ImageFormat::Rgb8),
            2 => Some(ImageFormat::Rgba8),
            _ => None,
        }
    }
}

/// A concrete raster payload referenced by image constant nodes.
///
/// The compiler treats the pixel data as an opaque blob; only the size
/// and format participate in operation metadata queries.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    /// Width and height in pixels.
    pub size: [u32; 2],
    /// Pixel format of `data`.
    pub format: ImageFormat,
    /// Row-major pixel bytes, `size[0] * size[1] * pixel_size()` long.
    pub data: Vec<u8>,
}

impl Image {
    /// Create a zero-filled image of the given size and format.
    pub fn new(size: [u32; 2], format: ImageFormat) -> Self {
        let len = size[0] as usize * size[1] as usize * format.pixel_size();
        Self {
            size,
            format,
            data: vec![0; len],
        }
    }
}

/// A concrete mesh payload referenced by mesh constant nodes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mesh {
    /// Vertex positions.
    pub positions: Vec<[f32; 3]>,
    /// Triangle-list indices into `positions`.
    pub indices: Vec<u32>,
}
