//! Routing of driver debug output into the log

use log::Level;

/// Message ids that are pure noise on common drivers (buffer placement hints,
/// framebuffer recompiles, shader recompiles)
pub const IGNORED_MESSAGE_IDS: [u32; 5] = [8, 131_169, 131_185, 131_218, 131_204];

/// Whether a message id is filtered out
pub fn is_ignored(id: u32) -> bool {
    IGNORED_MESSAGE_IDS.contains(&id)
}

/// Log level for a message of the given type and severity
pub fn message_level(gltype: u32, severity: u32) -> Level {
    if gltype == glow::DEBUG_TYPE_ERROR {
        Level::Error
    } else if severity == glow::DEBUG_SEVERITY_NOTIFICATION {
        Level::Info
    } else {
        Level::Warn
    }
}

fn source_name(source: u32) -> &'static str {
    match source {
        glow::DEBUG_SOURCE_API => "API",
        glow::DEBUG_SOURCE_WINDOW_SYSTEM => "Window System",
        glow::DEBUG_SOURCE_SHADER_COMPILER => "Shader Compiler",
        glow::DEBUG_SOURCE_THIRD_PARTY => "Third Party",
        glow::DEBUG_SOURCE_APPLICATION => "Application",
        _ => "Other",
    }
}

/// Debug callback body
pub fn log_message(source: u32, gltype: u32, id: u32, severity: u32, message: &str) {
    if is_ignored(id) {
        return;
    }
    log::log!(
        message_level(gltype, severity),
        "[OpenGL {}] ({id}) {}",
        source_name(source),
        message.trim_end()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_ids_are_filtered() {
        for id in IGNORED_MESSAGE_IDS {
            assert!(is_ignored(id));
        }
        assert!(!is_ignored(1281));
    }

    #[test]
    fn test_level_mapping() {
        assert_eq!(
            message_level(glow::DEBUG_TYPE_ERROR, glow::DEBUG_SEVERITY_NOTIFICATION),
            Level::Error
        );
        assert_eq!(
            message_level(glow::DEBUG_TYPE_OTHER, glow::DEBUG_SEVERITY_NOTIFICATION),
            Level::Info
        );
        assert_eq!(
            message_level(glow::DEBUG_TYPE_PERFORMANCE, glow::DEBUG_SEVERITY_HIGH),
            Level::Warn
        );
    }
}
