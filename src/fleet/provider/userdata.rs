//! Boot-script templating: `<%=name%>` is replaced by the contents of the
//! file `name`, resolved against the template's directory.
use std::path::Path;

use base64::Engine as _;

use crate::error::ConfigError;

const INCLUDE_OPEN: &str = "<%=";
const INCLUDE_CLOSE: &str = "%>";

/// Reads and expands the template at `path`, returning it base64-encoded.
///
/// # Errors
///
/// Returns an error when the template or an included file cannot be read,
/// or an include is not closed.
pub fn load_user_data(path: &Path) -> Result<String, ConfigError> {
    let template = read_file(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let expanded = expand_includes(&template, base_dir)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(expanded.as_bytes()))
}

/// Replaces every include marker with the named file's contents. Included
/// content is inserted verbatim and not expanded again.
///
/// # Errors
///
/// Returns an error for unreadable includes or a marker without `%>`.
pub fn expand_includes(template: &str, base_dir: &Path) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut consumed = 0usize;
    while let Some(start) = rest.find(INCLUDE_OPEN) {
        let (before, marker) = rest.split_at(start);
        out.push_str(before);
        let after_open = marker.get(INCLUDE_OPEN.len()..).unwrap_or_default();
        let Some(end) = after_open.find(INCLUDE_CLOSE) else {
            return Err(ConfigError::UnterminatedInclude {
                offset: consumed.saturating_add(start),
            });
        };
        let name = after_open.get(..end).unwrap_or_default().trim();
        out.push_str(&read_file(&base_dir.join(name))?);

        let skipped = start
            .saturating_add(INCLUDE_OPEN.len())
            .saturating_add(end)
            .saturating_add(INCLUDE_CLOSE.len());
        rest = rest.get(skipped..).unwrap_or_default();
        consumed = consumed.saturating_add(skipped);
    }
    out.push_str(rest);
    Ok(out)
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|err| ConfigError::ReadUserData {
        path: path.to_path_buf(),
        source: err,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn includes_are_expanded() -> Result<(), String> {
        let dir = tempdir().map_err(|err| format!("tempdir failed: {}", err))?;
        std::fs::write(dir.path().join("agent.conf"), "n=10")
            .map_err(|err| format!("write failed: {}", err))?;
        let expanded = expand_includes("#!/bin/sh\necho '<%= agent.conf %>' > /etc/agent\n", dir.path())
            .map_err(|err| err.to_string())?;
        if expanded != "#!/bin/sh\necho 'n=10' > /etc/agent\n" {
            return Err(format!("Unexpected expansion: {:?}", expanded));
        }
        Ok(())
    }

    #[test]
    fn two_includes_on_one_line() -> Result<(), String> {
        let dir = tempdir().map_err(|err| format!("tempdir failed: {}", err))?;
        std::fs::write(dir.path().join("a"), "A").map_err(|err| err.to_string())?;
        std::fs::write(dir.path().join("b"), "B").map_err(|err| err.to_string())?;
        let expanded =
            expand_includes("<%=a%>-<%=b%>", dir.path()).map_err(|err| err.to_string())?;
        if expanded != "A-B" {
            return Err(format!("Unexpected expansion: {:?}", expanded));
        }
        Ok(())
    }

    #[test]
    fn unterminated_include_reports_offset() -> Result<(), String> {
        match expand_includes("abc <%=oops", Path::new(".")) {
            Err(ConfigError::UnterminatedInclude { offset: 4 }) => Ok(()),
            Err(err) => Err(format!("Unexpected error: {}", err)),
            Ok(text) => Err(format!("Expected failure, got {:?}", text)),
        }
    }

    #[test]
    fn user_data_is_base64() -> Result<(), String> {
        let dir = tempdir().map_err(|err| format!("tempdir failed: {}", err))?;
        let path = dir.path().join("boot.sh");
        std::fs::write(&path, "hi").map_err(|err| err.to_string())?;
        let encoded = load_user_data(&path).map_err(|err| err.to_string())?;
        if encoded != "aGk=" {
            return Err(format!("Unexpected encoding: {}", encoded));
        }
        Ok(())
    }
}
