use path_absolutize::Absolutize;
use std::path::{Path, PathBuf};

use crate::config::ViewPaths;

/// `\` を `/` に統一し、連続するスラッシュを 1 つにまとめる。
///
/// 比較・キャッシュのキーに使うパスは必ずこの関数を通す。
pub fn normalize_separators(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_slash = false;
    for c in input.chars() {
        let c = if c == '\\' { '/' } else { c };
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(c);
    }
    out
}

/// 開始ディレクトリから祖先方向に `src` ディレクトリを探す。
///
/// - 開始パス自体が `src` ならそれを返す
/// - 見つからなければ `<start>/src` を返す (存在確認はしない)
pub fn find_src_root(start: &Path) -> PathBuf {
    let absolute = start
        .absolutize()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|_| start.to_path_buf());

    if absolute.file_name().is_some_and(|name| name == "src") {
        return absolute;
    }

    for ancestor in absolute.ancestors() {
        let candidate = ancestor.join("src");
        if candidate.is_dir() {
            return candidate;
        }
    }

    absolute.join("src")
}

/// src ルートを基準にしたパス解決。
///
/// ルート相対パスは常に `/views/home/index.vue` のように先頭 `/` 付きの
/// スラッシュ区切り文字列で扱う。
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    src_root: PathBuf,
    alias: String,
    views_root: String,
}

impl ProjectPaths {
    pub fn new(src_root: impl Into<PathBuf>, views: &ViewPaths) -> Self {
        let src_root: PathBuf = src_root.into();
        let src_root = src_root
            .absolutize()
            .map(|p| p.to_path_buf())
            .unwrap_or(src_root);
        let views_root = format!("/{}", views.root.trim_matches('/'));
        ProjectPaths {
            src_root,
            alias: views.alias.clone(),
            views_root,
        }
    }

    /// `start` から src ルートを探して構築する
    pub fn discover(start: &Path, views: &ViewPaths) -> Self {
        Self::new(find_src_root(start), views)
    }

    pub fn src_root(&self) -> &Path {
        &self.src_root
    }

    /// `/views` のようなビュールートのルート相対パス
    pub fn views_root(&self) -> &str {
        &self.views_root
    }

    /// ルート相対パスを実ファイルパスに変換する
    pub fn to_fs(&self, rel: &str) -> PathBuf {
        let rel = normalize_separators(rel);
        let trimmed = rel.trim_start_matches('/');
        if trimmed.is_empty() {
            return self.src_root.clone();
        }
        trimmed
            .split('/')
            .fold(self.src_root.clone(), |acc, part| acc.join(part))
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.to_fs(rel).is_file()
    }

    /// 実ファイルパスを src ルート相対に変換する (ルート外なら `None`)
    pub fn relativize(&self, path: &Path) -> Option<String> {
        let absolute = path.absolutize().ok()?;
        let rel = absolute.strip_prefix(&self.src_root).ok()?;
        let rel = normalize_separators(&rel.to_string_lossy());
        Some(format!("/{}", rel.trim_start_matches('/')))
    }

    /// import 指定子から、試すべきルート相対パスの候補を優先順に列挙する。
    ///
    /// - `@/x`       → `/x/index.<ext>`, `/x.<ext>`
    /// - `./x`, `../x` → 取り込み元ディレクトリ基準で `x.<ext>`, `x/index.<ext>`
    /// - `/x`        → ルート相対として `@/` と同じ規則
    /// - `x`         → ビュールート (`/views/x`) 基準で `@/` と同じ規則
    pub fn module_candidates(&self, spec: &str, importer: &str, exts: &[String]) -> Vec<String> {
        let spec = normalize_separators(spec.trim());
        if spec.is_empty() {
            return Vec::new();
        }

        let (base, index_first) = if let Some(rest) = spec.strip_prefix(self.alias.as_str()) {
            (format!("/{}", rest.trim_start_matches('/')), true)
        } else if is_relative(&spec) {
            let importer = normalize_separators(importer);
            let importer_dir = match importer.rfind('/') {
                Some(idx) => &importer[..idx],
                None => "",
            };
            let joined = self.to_fs(importer_dir).join(&spec);
            match self.relativize(&joined) {
                Some(rel) => (rel, false),
                None => return Vec::new(),
            }
        } else if spec.starts_with('/') {
            (spec.clone(), true)
        } else {
            (format!("{}/{}", self.views_root, spec), true)
        };

        expand_candidates(&base, exts, index_first)
    }

    /// 候補のうち最初に実在するものを返す。どれも無ければ `None`。
    pub fn resolve_module(&self, spec: &str, importer: &str, exts: &[String]) -> Option<String> {
        self.module_candidates(spec, importer, exts)
            .into_iter()
            .find(|candidate| self.exists(candidate))
    }
}

pub fn is_relative(spec: &str) -> bool {
    spec.starts_with("./") || spec.starts_with("../") || spec == "." || spec == ".."
}

fn expand_candidates(base: &str, exts: &[String], index_first: bool) -> Vec<String> {
    let base = base.trim_end_matches('/');
    if exts.iter().any(|ext| base.ends_with(ext.as_str())) {
        return vec![base.to_string()];
    }

    let with_ext: Vec<String> = exts.iter().map(|ext| format!("{base}{ext}")).collect();
    let with_index: Vec<String> = exts.iter().map(|ext| format!("{base}/index{ext}")).collect();

    let mut candidates = if index_first {
        [with_index, with_ext].concat()
    } else {
        [with_ext, with_index].concat()
    };

    // `../api/foo/index` のように index まで書かれている場合はディレクトリ名そのものも試す
    if let Some(stripped) = base.strip_suffix("/index") {
        candidates.extend(exts.iter().map(|ext| format!("{stripped}{ext}")));
    }

    let mut seen = std::collections::HashSet::new();
    candidates.retain(|c| seen.insert(c.clone()));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn exts(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn project() -> (tempfile::TempDir, ProjectPaths) {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        let paths = ProjectPaths::new(&src, &ViewPaths::default());
        (dir, paths)
    }

    #[test]
    fn normalizes_mixed_separators() {
        assert_eq!(normalize_separators(r"C:\proj\\src/views"), "C:/proj/src/views");
        assert_eq!(normalize_separators("a//b///c"), "a/b/c");
    }

    #[test]
    fn finds_src_in_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::create_dir_all(dir.path().join("docs/deep")).unwrap();

        let root = find_src_root(&dir.path().join("docs/deep"));
        assert_eq!(root, dir.path().join("src"));
    }

    #[test]
    fn falls_back_to_start_src_without_existence_check() {
        let dir = tempfile::tempdir().unwrap();
        let start = dir.path().join("nothing-here");
        let root = find_src_root(&start);
        assert!(root.ends_with("src"));
    }

    #[test]
    fn alias_candidates_try_index_first() {
        let (_dir, paths) = project();
        let candidates = paths.module_candidates("@/api/user", "/views/a.vue", &exts(&[".js"]));
        assert_eq!(candidates, vec!["/api/user/index.js", "/api/user.js"]);
    }

    #[test]
    fn relative_candidates_resolve_against_importer() {
        let (_dir, paths) = project();
        let candidates =
            paths.module_candidates("../../api/xgxt/index", "/views/home/a.vue", &exts(&[".js"]));
        assert_eq!(
            candidates,
            vec!["/api/xgxt/index.js", "/api/xgxt/index/index.js", "/api/xgxt.js"]
        );
    }

    #[test]
    fn bare_candidates_live_under_views() {
        let (_dir, paths) = project();
        let candidates = paths.module_candidates("home/Card", "/views/a.vue", &exts(&[".vue"]));
        assert_eq!(candidates, vec!["/views/home/Card/index.vue", "/views/home/Card.vue"]);
    }

    #[test]
    fn explicit_extension_is_kept() {
        let (_dir, paths) = project();
        let candidates = paths.module_candidates("@/views/x.vue", "/views/a.vue", &exts(&[".vue"]));
        assert_eq!(candidates, vec!["/views/x.vue"]);
    }

    #[test]
    fn resolve_returns_first_existing_candidate() {
        let (_dir, paths) = project();
        let file = paths.to_fs("/views/home/Card.vue");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, "<template/>").unwrap();

        assert_eq!(
            paths.resolve_module("./Card", "/views/home/index.vue", &exts(&[".vue"])),
            Some("/views/home/Card.vue".to_string())
        );
        assert_eq!(paths.resolve_module("./Missing", "/views/home/index.vue", &exts(&[".vue"])), None);
    }

    #[test]
    fn relative_path_escaping_root_is_dropped() {
        let (_dir, paths) = project();
        assert!(paths
            .module_candidates("../../../outside", "/views/a.vue", &exts(&[".js"]))
            .is_empty());
    }
}
