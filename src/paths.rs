//! Image file path resolution.
//!
//! Volumes are commonly referred to by prefix, leaving the extension
//! (and whether the file is compressed, or split into a header/data
//! pair) to be discovered on disk. This module holds the allowed
//! extension table and the resolution rules: a prefix must match
//! exactly one image on disk, where a header and its data file count
//! as the same image.

use crate::error::{ImageError, Result};
use std::io;
use std::path::{Path, PathBuf};

/// The file extensions recognized as volume images, most specific
/// first.
pub const ALLOWED_EXTENSIONS: [&str; 6] = ["nii.gz", "img.gz", "hdr.gz", "nii", "img", "hdr"];

/// Check that a file is a GZip compressed file.
pub fn is_gz_file<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .map(|a| a.to_string_lossy() == "gz")
        .unwrap_or(false)
}

/// The image extension carried by the file name, if any.
pub fn image_extension<P: AsRef<Path>>(path: P) -> Option<&'static str> {
    let name = path.as_ref().file_name()?.to_string_lossy().into_owned();
    ALLOWED_EXTENSIONS
        .iter()
        .find(|ext| {
            name.len() > ext.len() + 1 && name.ends_with(&format!(".{}", ext))
        })
        .copied()
}

/// Whether the file name ends in one of the allowed image extensions.
pub fn looks_like_image<P: AsRef<Path>>(path: P) -> bool {
    image_extension(path).is_some()
}

/// Strip the image extension from a path, if it has one.
pub fn remove_ext<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();
    match image_extension(path) {
        None => path.to_path_buf(),
        Some(ext) => {
            let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
            match name {
                None => path.to_path_buf(),
                Some(name) => {
                    let stem = &name[..name.len() - ext.len() - 1];
                    path.with_file_name(stem)
                }
            }
        }
    }
}

/// Resolve a path or prefix to exactly one image file on disk.
///
/// A path that already carries an image extension only has to exist.
/// A bare prefix is tried against every allowed extension; a header
/// and data file of the same kind count as one match, resolved to the
/// header file.
///
/// # Errors
///
/// - `ImageError::MissingVolumeFile` if nothing matches.
/// - `ImageError::AmbiguousImagePath` if more than one distinct image
///   matches the prefix.
pub fn add_ext<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    if looks_like_image(path) {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(ImageError::MissingVolumeFile(not_found(path)))
        };
    }

    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push('.');
    let mut groups: Vec<(&str, PathBuf)> = Vec::new();
    for ext in &ALLOWED_EXTENSIONS {
        let candidate = path.with_file_name(format!("{}{}", name, ext));
        if candidate.is_file() {
            // a header and its data file are the same image
            let group = match *ext {
                "hdr" | "img" => "hdr",
                "hdr.gz" | "img.gz" => "hdr.gz",
                other => other,
            };
            if !groups.iter().any(|(g, _)| *g == group) {
                groups.push((group, candidate));
            }
        }
    }

    match groups.len() {
        0 => Err(ImageError::MissingVolumeFile(not_found(path))),
        1 => {
            let (group, candidate) = groups.remove(0);
            // prefer the header file of a pair
            if group == "hdr" || group == "hdr.gz" {
                let header = path.with_file_name(format!("{}{}", name, group));
                if header.is_file() {
                    return Ok(header);
                }
            }
            Ok(candidate)
        }
        _ => Err(ImageError::AmbiguousImagePath(path.to_path_buf())),
    }
}

/// The data file paired with a header file: ".hdr" becomes ".img",
/// preserving compression.
pub fn companion_data_file<P: AsRef<Path>>(hdr_path: P) -> PathBuf {
    swap_pair_ext(hdr_path.as_ref(), "hdr", "img")
}

/// The header file paired with a data file: ".img" becomes ".hdr",
/// preserving compression.
pub fn companion_header_file<P: AsRef<Path>>(img_path: P) -> PathBuf {
    swap_pair_ext(img_path.as_ref(), "img", "hdr")
}

fn swap_pair_ext(path: &Path, from: &str, to: &str) -> PathBuf {
    let name = match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => return path.to_path_buf(),
    };
    let gz = format!(".{}.gz", from);
    let plain = format!(".{}", from);
    if name.ends_with(&gz) {
        let stem = &name[..name.len() - gz.len()];
        path.with_file_name(format!("{}.{}.gz", stem, to))
    } else if name.ends_with(&plain) {
        let stem = &name[..name.len() - plain.len()];
        path.with_file_name(format!("{}.{}", stem, to))
    } else {
        path.to_path_buf()
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no image matches {:?}", path),
    )
}
