//! Configuration file loading.
//!
//! The service reads a plain `key=value` file at startup (one pair per
//! line, `#` starts a comment). Missing keys and unparsable integers are
//! fatal at startup.

use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub redis_ip: String,
    pub redis_port: u16,
    pub redis_password: String,
    pub redis_pool_size: u16,
    pub mysql_ip: String,
    pub mysql_port: u16,
    pub mysql_db_name: String,
    pub mysql_user: String,
    pub mysql_password: String,
    pub mysql_pool_size: u16,
    pub id_start: u64,
    pub id_step: u32,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = fs::read_to_string(path)
            .map_err(|e| format!("cannot read config file {}: {}", path.display(), e))?;
        Self::parse(&text)
    }

    fn parse(text: &str) -> Result<Self, String> {
        let mut dict: HashMap<String, String> = HashMap::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(format!(
                    "line {}: expected key=value, got '{}'",
                    lineno + 1,
                    line
                ));
            };
            dict.insert(key.trim().to_string(), value.trim().to_string());
        }
        Ok(Self {
            redis_ip: required(&dict, "redis_server_ip")?,
            redis_port: parsed(&dict, "redis_server_port")?,
            redis_password: optional(&dict, "redis_server_password"),
            redis_pool_size: parsed(&dict, "redis_server_pool_size")?,
            mysql_ip: required(&dict, "mysql_server_ip")?,
            mysql_port: parsed(&dict, "mysql_server_port")?,
            mysql_db_name: required(&dict, "mysql_server_db_name")?,
            mysql_user: required(&dict, "mysql_server_user")?,
            mysql_password: optional(&dict, "mysql_server_password"),
            mysql_pool_size: parsed(&dict, "mysql_server_pool_size")?,
            id_start: parsed(&dict, "id_start")?,
            id_step: parsed(&dict, "id_step")?,
        })
    }
}

fn required(dict: &HashMap<String, String>, key: &str) -> Result<String, String> {
    dict.get(key)
        .cloned()
        .ok_or_else(|| format!("missing config key '{}'", key))
}

/// Password keys default to empty, matching unauthenticated local backends.
fn optional(dict: &HashMap<String, String>, key: &str) -> String {
    dict.get(key).cloned().unwrap_or_default()
}

fn parsed<T>(dict: &HashMap<String, String>, key: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: Display,
{
    required(dict, key)?
        .parse()
        .map_err(|e| format!("the value of config key '{}' is invalid: {}", key, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "\
# idforge service configuration
redis_server_ip = 127.0.0.1
redis_server_port = 6379
redis_server_pool_size = 3

mysql_server_ip = 127.0.0.1
mysql_server_port = 3306
mysql_server_db_name = idforge
mysql_server_user = root
mysql_server_password = secret
mysql_server_pool_size = 3

id_start = 1
id_step = 1000
";

    #[test]
    fn parses_a_full_file_with_comments_and_blank_lines() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.redis_port, 6379);
        assert_eq!(config.redis_password, "");
        assert_eq!(config.mysql_db_name, "idforge");
        assert_eq!(config.mysql_password, "secret");
        assert_eq!(config.id_step, 1000);
    }

    #[test]
    fn non_numeric_port_is_fatal() {
        let text = SAMPLE.replace("redis_server_port = 6379", "redis_server_port = alot");
        let err = Config::parse(&text).unwrap_err();
        assert!(err.contains("redis_server_port"));
    }

    #[test]
    fn missing_key_is_fatal() {
        let text = SAMPLE.replace("id_step = 1000", "");
        let err = Config::parse(&text).unwrap_err();
        assert!(err.contains("id_step"));
    }

    #[test]
    fn malformed_line_is_fatal() {
        let err = Config::parse("redis_server_ip\n").unwrap_err();
        assert!(err.contains("line 1"));
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.mysql_port, 3306);
    }
}
