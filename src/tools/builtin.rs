//! Built-in filesystem and web tools.
//!
//! Relative paths resolve against [`ToolContext::cwd`]. Each constructor
//! returns an `Arc<dyn ToolHandler>` ready for
//! [`ToolDispatcher::register`](super::dispatcher::ToolDispatcher::register).

use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;

use crate::error::HelmError;
use crate::provider::http::shared_client;
use crate::tools::tool::{FnTool, ToolContext, ToolHandler, ToolName};
use crate::tools::types::ToolParameters;
use crate::util::text::{chunk_utf8, truncate_utf8};
use crate::util::timeout::with_timeout;

const READ_FILE_MAX_BYTES: usize = 65_536;
const WEBSITE_CHUNK_BYTES: usize = 8_000;
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

static SCRIPT_OR_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)\b.*?</(script|style|noscript)\s*>")
        .expect("script/style regex must compile")
});
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag regex must compile"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex must compile"));

fn io_error(tool: ToolName, path: &Path, e: std::io::Error) -> HelmError {
    HelmError::tool(tool.to_string(), format!("{}: {e}", path.display()))
}

/// `create_folder`: create a directory and any missing parents.
pub fn create_folder_tool() -> Arc<dyn ToolHandler> {
    Arc::new(FnTool::new(
        ToolName::CreateFolder,
        "Create a folder, including missing parent folders",
        ToolParameters::object()
            .string("path", "Folder to create", true)
            .build(),
        |args, ctx: ToolContext| async move {
            let path = ctx.resolve(args.get_str("path")?);
            tokio::fs::create_dir_all(&path)
                .await
                .map_err(|e| io_error(ToolName::CreateFolder, &path, e))?;
            Ok(serde_json::json!({ "success": true, "path": path }))
        },
    ))
}

/// `write_to_file`: write UTF-8 content, creating parent folders.
pub fn write_to_file_tool() -> Arc<dyn ToolHandler> {
    Arc::new(FnTool::new(
        ToolName::WriteToFile,
        "Write content to a file, creating parent folders if needed",
        ToolParameters::object()
            .string("path", "File to write", true)
            .string("content", "Content to write", true)
            .build(),
        |args, ctx: ToolContext| async move {
            let path = ctx.resolve(args.get_str("path")?);
            let content = args.get_str("content")?;

            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| io_error(ToolName::WriteToFile, parent, e))?;
            }
            tokio::fs::write(&path, content)
                .await
                .map_err(|e| io_error(ToolName::WriteToFile, &path, e))?;

            Ok(serde_json::json!({
                "success": true,
                "path": path,
                "bytes_written": content.len(),
            }))
        },
    ))
}

/// `read_files`: read several files; per-file failures are reported inline.
pub fn read_files_tool() -> Arc<dyn ToolHandler> {
    Arc::new(FnTool::new(
        ToolName::ReadFiles,
        "Read one or more files as UTF-8 text",
        ToolParameters::object()
            .string_array("paths", "Files to read", true)
            .build(),
        |args, ctx: ToolContext| async move {
            let mut files = Vec::new();
            for raw in args.get_str_array("paths")? {
                let path = ctx.resolve(raw);
                let entry = match tokio::fs::read_to_string(&path).await {
                    Ok(content) => {
                        let truncated = content.len() > READ_FILE_MAX_BYTES;
                        serde_json::json!({
                            "path": raw,
                            "content": truncate_utf8(&content, READ_FILE_MAX_BYTES),
                            "bytes": content.len(),
                            "truncated": truncated,
                        })
                    }
                    Err(e) => serde_json::json!({ "path": raw, "error": e.to_string() }),
                };
                files.push(entry);
            }
            Ok(serde_json::json!({ "files": files }))
        },
    ))
}

/// `list_files`: sorted directory entries, optionally recursive.
pub fn list_files_tool() -> Arc<dyn ToolHandler> {
    Arc::new(FnTool::new(
        ToolName::ListFiles,
        "List files and folders under a path",
        ToolParameters::object()
            .string("path", "Folder to list (defaults to the working directory)", false)
            .boolean("recursive", "Include nested folders", false)
            .build(),
        |args, ctx: ToolContext| async move {
            let root = ctx.resolve(args.get_str_opt("path").unwrap_or("."));
            let recursive = args.get_bool_opt("recursive").unwrap_or(false);

            let mut entries = Vec::new();
            let mut pending = vec![root.clone()];
            while let Some(dir) = pending.pop() {
                let mut read_dir = tokio::fs::read_dir(&dir)
                    .await
                    .map_err(|e| io_error(ToolName::ListFiles, &dir, e))?;
                while let Some(entry) = read_dir
                    .next_entry()
                    .await
                    .map_err(|e| io_error(ToolName::ListFiles, &dir, e))?
                {
                    let file_type = entry
                        .file_type()
                        .await
                        .map_err(|e| io_error(ToolName::ListFiles, &entry.path(), e))?;
                    let path = entry.path();
                    let relative = path.strip_prefix(&root).unwrap_or(&path);
                    let kind = if file_type.is_dir() {
                        "dir"
                    } else if file_type.is_file() {
                        "file"
                    } else {
                        "other"
                    };
                    entries.push((relative.to_string_lossy().into_owned(), kind));
                    if recursive && file_type.is_dir() {
                        pending.push(path);
                    }
                }
            }
            entries.sort();

            let count = entries.len();
            let entries: Vec<_> = entries
                .into_iter()
                .map(|(name, kind)| serde_json::json!({ "name": name, "type": kind }))
                .collect();
            Ok(serde_json::json!({ "path": root, "entries": entries, "count": count }))
        },
    ))
}

/// `move_file`: rename a file or folder.
pub fn move_file_tool() -> Arc<dyn ToolHandler> {
    Arc::new(FnTool::new(
        ToolName::MoveFile,
        "Move or rename a file or folder",
        ToolParameters::object()
            .string("source", "Existing path", true)
            .string("destination", "New path", true)
            .build(),
        |args, ctx: ToolContext| async move {
            let source = ctx.resolve(args.get_str("source")?);
            let destination = ctx.resolve(args.get_str("destination")?);
            if let Some(parent) = destination.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| io_error(ToolName::MoveFile, parent, e))?;
            }
            tokio::fs::rename(&source, &destination)
                .await
                .map_err(|e| io_error(ToolName::MoveFile, &source, e))?;
            Ok(serde_json::json!({
                "success": true,
                "source": source,
                "destination": destination,
            }))
        },
    ))
}

/// `copy_file`: copy a single file.
pub fn copy_file_tool() -> Arc<dyn ToolHandler> {
    Arc::new(FnTool::new(
        ToolName::CopyFile,
        "Copy a file to a new location",
        ToolParameters::object()
            .string("source", "File to copy", true)
            .string("destination", "Target path", true)
            .build(),
        |args, ctx: ToolContext| async move {
            let source = ctx.resolve(args.get_str("source")?);
            let destination = ctx.resolve(args.get_str("destination")?);
            if let Some(parent) = destination.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| io_error(ToolName::CopyFile, parent, e))?;
            }
            let bytes = tokio::fs::copy(&source, &destination)
                .await
                .map_err(|e| io_error(ToolName::CopyFile, &source, e))?;
            Ok(serde_json::json!({
                "success": true,
                "destination": destination,
                "bytes_copied": bytes,
            }))
        },
    ))
}

/// `fetch_website`: download a page, reduce it to text, and return one chunk.
///
/// The chunk list is cached per URL for the session, so later chunks do not
/// re-download the page.
pub fn fetch_website_tool() -> Arc<dyn ToolHandler> {
    Arc::new(FnTool::new(
        ToolName::FetchWebsite,
        "Fetch a web page as plain text, one chunk at a time",
        ToolParameters::object()
            .string("url", "Page to fetch (http or https)", true)
            .integer("chunk_index", "Zero-based chunk to return (default 0)", false)
            .build(),
        |args, ctx: ToolContext| async move {
            let url = args.get_str("url")?;
            let index = args.get_u64_opt("chunk_index").unwrap_or(0) as usize;

            let chunks = match ctx.cache.get(url) {
                Some(chunks) => {
                    tracing::debug!(url, "website chunks served from cache");
                    chunks
                }
                None => {
                    let chunks = chunk_utf8(&fetch_text(url).await?, WEBSITE_CHUNK_BYTES);
                    ctx.cache.insert(url.to_string(), chunks.clone());
                    chunks
                }
            };

            let total = chunks.len();
            let content = match chunks.get(index) {
                Some(chunk) => chunk.clone(),
                None if total == 0 && index == 0 => String::new(),
                None => {
                    return Err(HelmError::InvalidArgument(format!(
                        "chunk_index {index} out of range ({total} chunks)"
                    )))
                }
            };

            Ok(serde_json::json!({
                "url": url,
                "chunk_index": index,
                "total_chunks": total,
                "content": content,
            }))
        },
    ))
}

async fn fetch_text(url: &str) -> Result<String, HelmError> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(HelmError::InvalidArgument(format!(
            "unsupported URL scheme: {url}"
        )));
    }
    let body = with_timeout(FETCH_TIMEOUT, async {
        let response = shared_client().get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HelmError::tool(
                ToolName::FetchWebsite.to_string(),
                format!("{url} returned HTTP {}", status.as_u16()),
            ));
        }
        Ok(response.text().await?)
    })
    .await?;
    Ok(html_to_text(&body))
}

/// Strip markup and collapse whitespace.
pub fn html_to_text(html: &str) -> String {
    let without_scripts = SCRIPT_OR_STYLE.replace_all(html, " ");
    let without_tags = TAG.replace_all(&without_scripts, " ");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    WHITESPACE.replace_all(&decoded, " ").trim().to_string()
}

/// Built-in handlers that need no external services.
pub fn all_tools() -> Vec<Arc<dyn ToolHandler>> {
    vec![
        create_folder_tool(),
        write_to_file_tool(),
        read_files_tool(),
        list_files_tool(),
        move_file_tool(),
        copy_file_tool(),
        fetch_website_tool(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::arguments::ToolArguments;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn args(value: serde_json::Value) -> ToolArguments {
        ToolArguments::new(value)
    }

    #[tokio::test]
    async fn write_then_read_relative_to_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());

        let written = write_to_file_tool()
            .execute(&args(json!({"path": "notes/a.txt", "content": "hello"})), &ctx)
            .await
            .unwrap();
        assert_eq!(written["bytes_written"], 5);

        let read = read_files_tool()
            .execute(&args(json!({"paths": ["notes/a.txt", "missing.txt"]})), &ctx)
            .await
            .unwrap();
        assert_eq!(read["files"][0]["content"], "hello");
        assert_eq!(read["files"][0]["truncated"], false);
        assert!(read["files"][1]["error"].is_string());
    }

    #[tokio::test]
    async fn list_files_sorts_and_recurses() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("zebra.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("alpha")).unwrap();
        std::fs::write(dir.path().join("alpha").join("inner.txt"), "").unwrap();
        let ctx = ToolContext::new(dir.path());

        let flat = list_files_tool().execute(&args(json!({})), &ctx).await.unwrap();
        let names: Vec<&str> = flat["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["alpha", "zebra.txt"]);

        let deep = list_files_tool()
            .execute(&args(json!({"recursive": true})), &ctx)
            .await
            .unwrap();
        assert_eq!(deep["count"], 3);
    }

    #[tokio::test]
    async fn create_move_and_copy() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());

        create_folder_tool()
            .execute(&args(json!({"path": "a/b"})), &ctx)
            .await
            .unwrap();
        assert!(dir.path().join("a/b").is_dir());

        std::fs::write(dir.path().join("one.txt"), "data").unwrap();
        copy_file_tool()
            .execute(&args(json!({"source": "one.txt", "destination": "a/two.txt"})), &ctx)
            .await
            .unwrap();
        move_file_tool()
            .execute(&args(json!({"source": "one.txt", "destination": "a/b/three.txt"})), &ctx)
            .await
            .unwrap();

        assert!(!dir.path().join("one.txt").exists());
        assert_eq!(std::fs::read_to_string(dir.path().join("a/two.txt")).unwrap(), "data");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a/b/three.txt")).unwrap(),
            "data"
        );
    }

    #[tokio::test]
    async fn move_missing_source_is_a_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = move_file_tool()
            .execute(
                &args(json!({"source": "nope", "destination": "x"})),
                &ToolContext::new(dir.path()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HelmError::ToolExecution { .. }));
    }

    #[test]
    fn html_to_text_drops_markup_and_scripts() {
        let html = "<html><head><style>p{}</style><script>alert(1)</script></head>\
                    <body><p>Fish &amp; chips</p>\n<p>are   good</p></body></html>";
        assert_eq!(html_to_text(html), "Fish & chips are good");
    }

    #[tokio::test]
    async fn fetch_website_chunks_and_caches() {
        let server = MockServer::start().await;
        let body = format!("<p>{}</p>", "word ".repeat(3_000));
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;

        let ctx = ToolContext::new("/tmp");
        let url = format!("{}/page", server.uri());
        let tool = fetch_website_tool();

        let first = tool.execute(&args(json!({"url": url})), &ctx).await.unwrap();
        assert_eq!(first["total_chunks"], 2);
        assert_eq!(first["chunk_index"], 0);

        let second = tool
            .execute(&args(json!({"url": url, "chunk_index": 1})), &ctx)
            .await
            .unwrap();
        assert!(!second["content"].as_str().unwrap().is_empty());

        let err = tool
            .execute(&args(json!({"url": url, "chunk_index": 5})), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, HelmError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn fetch_website_reports_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = fetch_website_tool()
            .execute(
                &args(json!({"url": format!("{}/gone", server.uri())})),
                &ToolContext::new("/tmp"),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn every_builtin_has_an_object_schema() {
        for tool in all_tools() {
            assert_eq!(tool.parameters().schema["type"], "object", "{}", tool.name());
            assert!(!tool.description().is_empty());
        }
    }
}
