use crate::constants::SUPPORTED_IMAGE_EXTENSIONS;
use crate::error::{EvidenceError, Result};
use glob::glob;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Resolves a file, a directory or a glob pattern into the image files it
/// names. Hidden entries are skipped when walking directories.
pub fn collect_image_files(input: &str, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut image_files = Vec::new();

    let input_path = Path::new(input);
    let canonical_input = if input_path.exists() {
        input_path
            .canonicalize()
            .map_err(|_| EvidenceError::NoImageFilesFound(input.to_string()))?
    } else {
        input_path.to_path_buf()
    };

    if canonical_input.is_file() {
        image_files.push(canonical_input);
    } else if canonical_input.is_dir() {
        let walker = if recursive {
            WalkDir::new(&canonical_input)
        } else {
            WalkDir::new(&canonical_input).max_depth(1)
        };

        // depth 0 is the input itself, which may legitimately be hidden
        for entry in walker.sort_by_file_name().into_iter().filter_entry(|e| {
            e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.')
        }) {
            let entry = entry?;
            let path = entry.path();

            if path.is_file() && is_image_file(path) {
                if let Ok(canonical_path) = path.canonicalize() {
                    image_files.push(canonical_path);
                }
            }
        }
    } else if let Ok(glob_pattern) = glob(input) {
        for entry in glob_pattern.flatten() {
            if entry.is_file() && is_image_file(&entry) {
                if let Ok(canonical_path) = entry.canonicalize() {
                    image_files.push(canonical_path);
                }
            }
        }
    } else {
        return Err(EvidenceError::NoImageFilesFound(input.to_string()));
    }

    Ok(image_files)
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| SUPPORTED_IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("fachada.jpg")));
        assert!(is_image_file(Path::new("fachada.JPEG")));
        assert!(is_image_file(Path::new("techo.png")));
        assert!(is_image_file(Path::new("techo.webp")));
        assert!(!is_image_file(Path::new("notas.txt")));
        assert!(!is_image_file(Path::new("sin_extension")));
    }

    #[test]
    fn test_collect_image_files_single_file() {
        let temp_dir = TempDir::new().unwrap();
        let test_file = temp_dir.path().join("test.jpg");
        File::create(&test_file).unwrap();

        let files = collect_image_files(&test_file.to_string_lossy(), false).unwrap();
        assert_eq!(files, vec![test_file.canonicalize().unwrap()]);
    }

    #[test]
    fn test_collect_image_files_directory_skips_non_images() {
        let temp_dir = TempDir::new().unwrap();
        File::create(temp_dir.path().join("a.jpg")).unwrap();
        File::create(temp_dir.path().join("b.png")).unwrap();
        File::create(temp_dir.path().join("notes.txt")).unwrap();
        File::create(temp_dir.path().join(".hidden.jpg")).unwrap();

        let files = collect_image_files(&temp_dir.path().to_string_lossy(), false).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.png"]);
    }

    #[test]
    fn test_collect_image_files_recursion() {
        let temp_dir = TempDir::new().unwrap();
        let subdir = temp_dir.path().join("sala");
        std::fs::create_dir(&subdir).unwrap();
        File::create(temp_dir.path().join("top.jpg")).unwrap();
        File::create(subdir.join("nested.jpg")).unwrap();

        let flat = collect_image_files(&temp_dir.path().to_string_lossy(), false).unwrap();
        assert_eq!(flat.len(), 1);

        let deep = collect_image_files(&temp_dir.path().to_string_lossy(), true).unwrap();
        assert_eq!(deep.len(), 2);
    }

    #[test]
    fn test_collect_image_files_glob_pattern() {
        let temp_dir = TempDir::new().unwrap();
        File::create(temp_dir.path().join("test1.jpg")).unwrap();
        File::create(temp_dir.path().join("test2.png")).unwrap();

        let pattern = format!("{}/*.jpg", temp_dir.path().to_string_lossy());
        let files = collect_image_files(&pattern, false).unwrap();
        assert_eq!(files.len(), 1);
    }
}
