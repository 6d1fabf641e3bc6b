use anyhow::Error;
use opencv::core::{Mat, MatTraitConst, Vector};
use opencv::imgcodecs::{imdecode, imencode, IMREAD_COLOR};

/// One captured camera frame. The buffer is consumed by a single inference
/// cycle and never retained.
#[derive(Debug, Clone)]
pub struct Frame {
    pub mat: Mat,
}

impl Frame {
    pub fn new(mat: Mat) -> Self {
        Frame { mat }
    }

    pub fn width(&self) -> i32 {
        self.mat.cols()
    }

    pub fn height(&self) -> i32 {
        self.mat.rows()
    }
}

/// encode_frame_jpeg compresses the frame buffer for submission to the
/// inference service.
pub fn encode_frame_jpeg(frame: &Frame) -> Result<Vec<u8>, Error> {
    let mut encoded: Vector<u8> = Vector::new();
    let params: Vector<i32> = Vector::new();
    let ok = match imencode(".jpg", &frame.mat, &mut encoded, &params) {
        Ok(ok) => ok,
        Err(e) => return Err(Error::from(e)),
    };
    if !ok {
        return Err(Error::msg("image - jpeg encoder rejected the frame"));
    }
    Ok(encoded.to_vec())
}

/// decode_image decodes a compressed image buffer back into a frame.
pub fn decode_image(im_bytes: &[u8]) -> Result<Frame, Error> {
    let buf = match Mat::from_slice(im_bytes) {
        Ok(buf) => buf,
        Err(e) => return Err(Error::from(e)),
    };

    let mat = match imdecode(&buf, IMREAD_COLOR) {
        Ok(mat) => mat,
        Err(e) => return Err(Error::from(e)),
    };

    // The decoder reports failure through an empty matrix, not an error.
    if mat.rows() == 0 {
        return Err(Error::msg("image - buffer is not a decodable image"));
    }

    Ok(Frame::new(mat))
}
