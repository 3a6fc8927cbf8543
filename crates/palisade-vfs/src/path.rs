//! Root path helpers.
//!
//! Root paths are absolute, `/`-separated, and folders always end with a trailing `/`.

/// Path separator.
pub const SEPARATOR: char = '/';

/// The root folder.
pub const ROOT: &str = "/";

/// Whether the path denotes a folder.
pub fn is_folder_path(path: &str) -> bool {
    path.ends_with(SEPARATOR)
}

/// Returns the parent folder of a path, or `None` for the root folder.
///
/// `/a/b/c.txt` has parent `/a/b/`, `/a/b/` has parent `/a/`.
pub fn parent_folder(path: &str) -> Option<&str> {
    let trimmed = path.strip_suffix(SEPARATOR).unwrap_or(path);
    if trimmed.is_empty() {
        return None;
    }
    trimmed.rfind(SEPARATOR).map(|idx| &path[..=idx])
}

/// Returns the last path element, keeping the trailing `/` of folders.
pub fn name(path: &str) -> &str {
    match parent_folder(path) {
        Some(parent) => &path[parent.len()..],
        None => path,
    }
}

/// Iterates the ancestor folders of a path, nearest first.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(parent_folder(path), |p| parent_folder(*p))
}

/// Whether `path` lies strictly below the folder `folder`.
pub fn is_below(path: &str, folder: &str) -> bool {
    is_folder_path(folder) && path.len() > folder.len() && path.starts_with(folder)
}

/// Whether the path is a well-formed absolute root path.
pub fn is_valid(path: &str) -> bool {
    path.starts_with(SEPARATOR) && !path.contains("//") && !path.contains("/../") && !path.ends_with("/..")
}

/// Appends a child name to a folder path.
pub fn join(folder: &str, child: &str) -> String {
    if is_folder_path(folder) {
        format!("{}{}", folder, child)
    } else {
        format!("{}{}{}", folder, SEPARATOR, child)
    }
}
