use std::path::Path;

use projgen::export::relative_path;

#[derive(Clone, Copy, Debug, Default)]
pub struct Verbosity {
    pub json: bool,
    pub verbose: bool,
}

/// Path shown to the user: relative to the project root when it lives beneath it.
pub fn display_path(root: &Path, path: &Path) -> String {
    if path.starts_with(root) {
        relative_path(root, path)
    } else {
        path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_under_root_are_shortened() {
        let root = Path::new("/work/game");
        assert_eq!(
            display_path(root, Path::new("/work/game/Generated/Core.csproj")),
            "Generated/Core.csproj"
        );
        assert_eq!(display_path(root, Path::new("/elsewhere/x.sln")), "/elsewhere/x.sln");
    }
}
