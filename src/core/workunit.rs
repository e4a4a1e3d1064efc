//! 作品（work-unit）与章节发现
//!
//! 根目录下每个子目录是一部作品：`<作品>/goc/*.txt` 为原文，`<作品>/dich/*.txt` 为同名译文，
//! `<作品>/story_data.sqlite` 为术语库（目录名与文件名可配置）。章节是否已译只看译文文件是否存在。

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::AppSection;
use crate::core::PipelineError;

#[derive(Clone, Debug)]
pub struct WorkUnit {
    pub name: String,
    pub root: PathBuf,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub store_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct Chapter {
    /// 文件名（同时作为日志与报告中的章节标识）
    pub name: String,
    pub source: PathBuf,
    pub output: PathBuf,
}

impl WorkUnit {
    pub fn new(root: impl Into<PathBuf>, layout: &AppSection) -> Self {
        let root = root.into();
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());
        Self {
            name,
            input_dir: root.join(&layout.input_dir),
            output_dir: root.join(&layout.output_dir),
            store_path: root.join(&layout.store_file),
            root,
        }
    }

    /// 根目录下的子目录，按名字排序；根目录不存在时返回空
    pub fn discover(root: &Path, layout: &AppSection) -> Result<Vec<WorkUnit>, PipelineError> {
        if !root.is_dir() {
            return Ok(Vec::new());
        }
        let mut units = Vec::new();
        for entry in WalkDir::new(root).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| PipelineError::io(root, e.into()))?;
            if entry.file_type().is_dir() {
                units.push(WorkUnit::new(entry.path(), layout));
            }
        }
        Ok(units)
    }

    pub fn has_input(&self) -> bool {
        self.input_dir.is_dir()
    }

    pub fn has_store(&self) -> bool {
        self.store_path.exists()
    }

    /// 输入目录中的 `*.txt`，按文件名排序
    pub fn chapters(&self) -> Result<Vec<Chapter>, PipelineError> {
        let dir = self.input_dir.to_str().ok_or_else(|| {
            PipelineError::Discovery(format!("non UTF-8 path: {}", self.input_dir.display()))
        })?;
        let pattern = format!("{}/*.txt", glob::Pattern::escape(dir));
        let paths = glob::glob(&pattern).map_err(|e| PipelineError::Discovery(e.to_string()))?;

        let mut chapters = Vec::new();
        for path in paths {
            let path = path.map_err(|e| PipelineError::Discovery(e.to_string()))?;
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            chapters.push(Chapter {
                output: self.output_dir.join(&name),
                name,
                source: path,
            });
        }
        chapters.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(chapters)
    }
}

impl Chapter {
    pub fn is_translated(&self) -> bool {
        self.output.exists()
    }

    pub fn read(&self) -> Result<String, PipelineError> {
        std::fs::read_to_string(&self.source).map_err(|e| PipelineError::io(&self.source, e))
    }

    pub fn write_output(&self, text: &str) -> Result<(), PipelineError> {
        std::fs::write(&self.output, text).map_err(|e| PipelineError::io(&self.output, e))
    }
}
