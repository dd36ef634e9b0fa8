//! File-system helpers for the inference driver.

use crate::core::{ClassifierError, ClassifierResult};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extensions accepted when scanning a directory for images.
const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "png", "jpeg", "JPEG", "JPG", "bmp"];

/// Loads and decodes an image from disk.
///
/// # Errors
///
/// Returns `ClassifierError::NotFound` if the path does not exist and
/// `ClassifierError::ImageLoad` if decoding fails.
pub fn load_image(path: &Path) -> ClassifierResult<DynamicImage> {
    if !path.exists() {
        return Err(ClassifierError::not_found(
            path.display().to_string(),
            "image file does not exist",
        ));
    }
    debug!(path = %path.display(), "loading image");
    Ok(image::open(path)?)
}

/// Collects the image files to classify from a path.
///
/// A file path yields just that file. A directory is scanned
/// (non-recursively) for files with a recognized image extension, and
/// the matches are returned in sorted order so runs are reproducible.
///
/// # Errors
///
/// Returns `ClassifierError::NotFound` if the path does not exist or a
/// directory contains no image files.
pub fn collect_image_files(path: &Path) -> ClassifierResult<Vec<PathBuf>> {
    if !path.exists() {
        return Err(ClassifierError::not_found(
            path.display().to_string(),
            "input path does not exist",
        ));
    }

    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && has_image_extension(p))
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(ClassifierError::not_found(
            path.display().to_string(),
            "directory contains no image files",
        ));
    }
    debug!(count = files.len(), "collected image files");
    Ok(files)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext))
}

/// Reads a label file: one class name per line, indexed by class id.
///
/// Blank lines are kept out; surrounding whitespace is trimmed.
pub fn load_class_names(path: &Path) -> ClassifierResult<Vec<String>> {
    if !path.exists() {
        return Err(ClassifierError::not_found(
            path.display().to_string(),
            "label file does not exist",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    #[test]
    fn single_file_path_is_returned_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("cat.jpg");
        File::create(&file).unwrap();
        assert_eq!(collect_image_files(&file).unwrap(), vec![file]);
    }

    #[test]
    fn directory_scan_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.jpg", "notes.txt", "c.JPEG", "d.tiff"] {
            File::create(dir.path().join(name)).unwrap();
        }
        let files = collect_image_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.png", "c.JPEG"]);
    }

    #[test]
    fn empty_directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = collect_image_files(dir.path()).unwrap_err();
        assert!(matches!(err, ClassifierError::NotFound { .. }));
    }

    #[test]
    fn missing_path_is_not_found() {
        let err = collect_image_files(Path::new("/nonexistent/xyz")).unwrap_err();
        assert!(matches!(err, ClassifierError::NotFound { .. }));
    }

    #[test]
    fn label_file_maps_lines_to_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.txt");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "tench").unwrap();
        writeln!(f, "  goldfish ").unwrap();
        writeln!(f).unwrap();
        writeln!(f, "great white shark").unwrap();
        drop(f);

        let names = load_class_names(&path).unwrap();
        assert_eq!(names, vec!["tench", "goldfish", "great white shark"]);
    }
}
