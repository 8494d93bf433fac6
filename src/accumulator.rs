//! Persisted multi-visualization HTML document
//!
//! The artifact is an HTML shell written once. Each accepted chart becomes a
//! self-contained fragment spliced in front of the closing `</body>`, so
//! earlier fragments are never rewritten and document order equals arrival
//! order.

use crate::error::{PipelineError, PipelineResult};
use crate::types::{FragmentId, SpecTree};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tokio::sync::Mutex;
use tracing::{debug, info};

const CLOSING_MARKER: &str = "</body>";
const TARGET_PREFIX: &str = "<div id=\"";
const FRAGMENT_ID_PREFIX: &str = "vis_";

/// Owns one artifact file; `append` calls are serialized per instance
pub struct DocumentAccumulator {
    path: PathBuf,
    title: String,
    write_lock: Mutex<()>,
    next_seq: AtomicU64,
}

impl DocumentAccumulator {
    pub fn new(path: impl Into<PathBuf>, title: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            title: title.into(),
            write_lock: Mutex::new(()),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the shell if the artifact does not exist yet. Safe to call repeatedly.
    pub async fn ensure_initialized(&self) -> PipelineResult<()> {
        let _guard = self.write_lock.lock().await;
        self.initialize_locked().await
    }

    async fn initialize_locked(&self) -> PipelineResult<()> {
        match tokio::fs::metadata(&self.path).await {
            Ok(_) => {
                let existing = self.fragment_ids_locked().await?.len() as u64;
                self.next_seq.fetch_max(existing, Ordering::SeqCst);
                debug!("Artifact {} already present ({} fragments)", self.path.display(), existing);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| PipelineError::write_failed(&self.path, e))?;
                }
                write_atomic(&self.path, &render_shell(&self.title)).await?;
                info!("Initialized artifact {}", self.path.display());
                Ok(())
            }
            Err(e) => Err(PipelineError::write_failed(&self.path, e)),
        }
    }

    /// Allocate an id that no fragment in this artifact uses yet
    pub fn next_fragment_id(&self) -> FragmentId {
        let millis = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        FragmentId(format!("{}{}_{}", FRAGMENT_ID_PREFIX, millis, seq))
    }

    /// Splice a fragment rendering `bound_spec` before the closing marker.
    ///
    /// Initializes the artifact if needed. Fails without touching the file
    /// when `id` is already present.
    pub async fn append(&self, id: &FragmentId, bound_spec: &SpecTree) -> PipelineResult<()> {
        let _guard = self.write_lock.lock().await;
        self.initialize_locked().await?;

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| PipelineError::write_failed(&self.path, e))?;

        if collect_fragment_ids(&content).iter().any(|existing| existing == id) {
            return Err(PipelineError::write_failed(
                &self.path,
                std::io::Error::new(
                    ErrorKind::AlreadyExists,
                    format!("fragment id {} already present", id),
                ),
            ));
        }

        let fragment = render_fragment(id, bound_spec)
            .map_err(|e| PipelineError::write_failed(&self.path, e.into()))?;
        let insertion_point = content.rfind(CLOSING_MARKER).unwrap_or(content.len());

        let mut updated = String::with_capacity(content.len() + fragment.len());
        updated.push_str(&content[..insertion_point]);
        updated.push_str(&fragment);
        updated.push_str(&content[insertion_point..]);

        write_atomic(&self.path, &updated).await?;
        debug!("Appended fragment {} to {}", id, self.path.display());
        Ok(())
    }

    /// Fragment ids in document order
    pub async fn fragment_ids(&self) -> PipelineResult<Vec<FragmentId>> {
        let _guard = self.write_lock.lock().await;
        self.fragment_ids_locked().await
    }

    async fn fragment_ids_locked(&self) -> PipelineResult<Vec<FragmentId>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(collect_fragment_ids(&content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(PipelineError::write_failed(&self.path, e)),
        }
    }
}

/// Write through a sibling temp file and rename over the target
async fn write_atomic(path: &Path, content: &str) -> PipelineResult<()> {
    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp, content)
        .await
        .map_err(|e| PipelineError::write_failed(path, e))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(PipelineError::write_failed(path, e));
    }
    Ok(())
}

fn collect_fragment_ids(content: &str) -> Vec<FragmentId> {
    content
        .match_indices(TARGET_PREFIX)
        .filter_map(|(idx, _)| {
            let rest = &content[idx + TARGET_PREFIX.len()..];
            let id = &rest[..rest.find('"')?];
            id.starts_with(FRAGMENT_ID_PREFIX)
                .then(|| FragmentId(id.to_string()))
        })
        .collect()
}

fn render_shell(title: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>{title}</title>
    <script src="https://cdn.jsdelivr.net/npm/vega@5"></script>
    <script src="https://cdn.jsdelivr.net/npm/vega-lite@5"></script>
    <script src="https://cdn.jsdelivr.net/npm/vega-embed@6"></script>
    <style>
        body {{
            font-family: Arial, sans-serif;
            margin: 20px;
        }}
        .visualization {{
            margin-bottom: 50px;
        }}
    </style>
</head>
<body>
    <h1>{title}</h1>
</body>
</html>
"#,
        title = escape_html(title)
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

fn render_fragment(id: &FragmentId, bound_spec: &SpecTree) -> serde_json::Result<String> {
    // `</` inside the JSON must not close the script element
    let spec_json = serde_json::to_string_pretty(bound_spec)?.replace("</", "<\\/");
    Ok(format!(
        r##"
    <div class="visualization">
        <div id="{id}"></div>
        <script>
            vegaEmbed("#{id}", {spec}).catch(console.error);
        </script>
    </div>
"##,
        id = id,
        spec = spec_json
    ))
}
