use std::fs;
use std::path::{Path, PathBuf};

use spa_route_api_analyzer::resolver::ProjectPaths;
use spa_route_api_analyzer::{Analysis, Analyzer, AnalyzerConfig, OutputMode};
use tempfile::TempDir;

/// 一時ディレクトリに `<tmp>/app/src/...` を作るテスト用プロジェクト
pub struct Project {
    dir: TempDir,
}

#[allow(dead_code)]
impl Project {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("app").join("src")).unwrap();
        Project { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn src(&self) -> PathBuf {
        self.dir.path().join("app").join("src")
    }

    /// src ルート相対 (`router/routes.js` など) でファイルを書く
    pub fn write(&self, rel: &str, content: &str) -> &Self {
        let path = self.src().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
        self
    }

    pub fn analyze(&self, mode: OutputMode) -> Analysis {
        self.analyze_with(AnalyzerConfig::default(), mode)
    }

    pub fn analyze_with(&self, config: AnalyzerConfig, mode: OutputMode) -> Analysis {
        let paths = ProjectPaths::new(self.src(), &config.paths.views);
        Analyzer::with_paths(paths, config).run(mode)
    }
}

pub const LOADER: &str = "const _import = file => () => import('@/views' + file + '.vue')\n";

/// `home` ルート → 一覧 API を呼ぶ画面、の最小構成
pub fn home_project() -> Project {
    let project = Project::new();
    project
        .write(
            "router/routes.js",
            &format!(
                "{LOADER}
export default [
  {{ path: '/home', name: 'home', component: _import('/modules/home') }},
]
"
            ),
        )
        .write(
            "views/modules/home/index.vue",
            "<template><div /></template>
<script>
import { getList } from '@/api/list'
export default {
  created() { getList() }
}
</script>
",
        )
        .write(
            "api/list.js",
            "import request from '@/utils/request'

// 一覧を取得
export function getList() {
  return request({ url: '/api/list' })
}
",
        );
    project
}
