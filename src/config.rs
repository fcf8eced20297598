use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::env;
use crate::processor::DetectionConfig;

/// 默认监听端口
pub const DEFAULT_PORT: u16 = 5000;
/// 默认日志级别
pub const DEFAULT_LOG_LEVEL: &str = "info";

const CONFIG_FILE_NAME: &str = "shot-detection.ini";
const HIDDEN_CONFIG_FILE_NAME: &str = ".shot-detection.ini";

/// 服务完整配置
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// 镜头检测配置
    pub detection: DetectionConfig,
    /// 监听端口
    pub port: u16,
    /// 日志级别（trace, debug, info, warn, error）
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            detection: DetectionConfig::default(),
            port: DEFAULT_PORT,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl ServiceConfig {
    /// 监听地址，固定绑定所有网卡
    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

/// 单一来源（命令行、环境变量或配置文件）提供的可选配置项
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub threshold: Option<f64>,
    pub min_scene_len: Option<u64>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
}

impl ConfigOverrides {
    /// 从进程环境变量读取
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 通过查找函数读取环境变量，已设置但无法解析的值直接报错
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            threshold: parse_var(&lookup, "SHOT_DETECTION_THRESHOLD")?,
            min_scene_len: parse_var(&lookup, "SHOT_DETECTION_MIN_SCENE_LEN")?,
            port: parse_var(&lookup, "PORT")?,
            log_level: lookup("LOG_LEVEL").filter(|v| !v.is_empty()),
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .with_context(|| format!("invalid {} value: {}", key, value))
        })
        .transpose()
}

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从多个源加载配置，优先级：命令行参数 > 环境变量 > 配置文件 > 默认值
    pub fn load(config_file: Option<&Path>, cli: ConfigOverrides) -> Result<ServiceConfig> {
        let file_config = match config_file {
            // 显式指定的配置文件必须能读取
            Some(path) => Some(Self::load_from_file(path)?),
            None => Self::load_from_default_locations()?,
        };

        let env_config = ConfigOverrides::from_env()?;
        Self::merge(cli, env_config, file_config.unwrap_or_default())
    }

    /// 合并三个来源的配置
    pub fn merge(
        cli: ConfigOverrides,
        env_config: ConfigOverrides,
        file_config: ConfigOverrides,
    ) -> Result<ServiceConfig> {
        let defaults = ServiceConfig::default();

        let threshold = cli
            .threshold
            .or(env_config.threshold)
            .or(file_config.threshold)
            .unwrap_or(defaults.detection.threshold);

        if !threshold.is_finite() || threshold < 0.0 {
            anyhow::bail!("threshold must be a non-negative number, got {}", threshold);
        }

        Ok(ServiceConfig {
            detection: DetectionConfig {
                threshold,
                min_scene_len: cli
                    .min_scene_len
                    .or(env_config.min_scene_len)
                    .or(file_config.min_scene_len)
                    .unwrap_or(defaults.detection.min_scene_len),
            },
            port: cli
                .port
                .or(env_config.port)
                .or(file_config.port)
                .unwrap_or(defaults.port),
            log_level: cli
                .log_level
                .or(env_config.log_level)
                .or(file_config.log_level)
                .unwrap_or(defaults.log_level),
        })
    }

    /// 从 INI 配置文件加载
    pub fn load_from_file(config_path: &Path) -> Result<ConfigOverrides> {
        if !config_path.exists() {
            return Err(anyhow::anyhow!("config file not found: {}", config_path.display()));
        }

        let mut config_parser = configparser::ini::Ini::new();
        config_parser.load(config_path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {}", config_path.display(), e))?;

        // 先读对应节，没有则回退到 [DEFAULT] 节
        let get = |section: &str, key: &str| {
            config_parser
                .get(section, key)
                .or_else(|| config_parser.get("DEFAULT", key))
                .filter(|v| !v.trim().is_empty())
        };

        let threshold = get("shot_detection", "threshold")
            .map(|v| v.trim().parse::<f64>())
            .transpose()
            .context("invalid threshold in config file")?;

        let min_scene_len = get("shot_detection", "min_scene_len")
            .map(|v| v.trim().parse::<u64>())
            .transpose()
            .context("invalid min_scene_len in config file")?;

        let port = get("server", "port")
            .map(|v| v.trim().parse::<u16>())
            .transpose()
            .context("invalid port in config file")?;

        let log_level = get("logging", "level");

        Ok(ConfigOverrides {
            threshold,
            min_scene_len,
            port,
            log_level,
        })
    }

    /// 从默认位置查找配置文件，都不存在时返回 None
    fn load_from_default_locations() -> Result<Option<ConfigOverrides>> {
        for candidate in Self::default_locations() {
            if candidate.exists() {
                tracing::debug!("使用配置文件: {}", candidate.display());
                return Self::load_from_file(&candidate).map(Some);
            }
        }
        Ok(None)
    }

    /// 默认配置文件位置（按优先级排序）
    pub fn default_locations() -> Vec<PathBuf> {
        let mut locations = vec![
            PathBuf::from(CONFIG_FILE_NAME),
            PathBuf::from(HIDDEN_CONFIG_FILE_NAME),
        ];
        if let Some(home) = env::var_os("HOME") {
            locations.push(PathBuf::from(home).join(HIDDEN_CONFIG_FILE_NAME));
        }
        locations.push(PathBuf::from("/etc").join(CONFIG_FILE_NAME));
        locations
    }

    /// 创建默认配置文件
    pub fn create_default_config(config_path: &Path) -> Result<()> {
        let defaults = ServiceConfig::default();

        let mut config_parser = configparser::ini::Ini::new();
        config_parser.set("shot_detection", "threshold", Some(format!("{:.1}", defaults.detection.threshold)));
        config_parser.set("shot_detection", "min_scene_len", Some(defaults.detection.min_scene_len.to_string()));
        config_parser.set("server", "port", Some(defaults.port.to_string()));
        config_parser.set("logging", "level", Some(defaults.log_level));

        config_parser.write(config_path)
            .map_err(|e| anyhow::anyhow!("failed to write config file {}: {}", config_path.display(), e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ConfigLoader::merge(
            ConfigOverrides::default(),
            ConfigOverrides::default(),
            ConfigOverrides::default(),
        )
        .unwrap();

        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.port, 5000);
        assert_eq!(config.detection.threshold, 27.0);
        assert_eq!(config.bind_addr(), "0.0.0.0:5000");
    }

    #[test]
    fn test_precedence_cli_env_file() {
        let cli = ConfigOverrides {
            threshold: Some(10.0),
            ..Default::default()
        };
        let env_config = ConfigOverrides {
            threshold: Some(20.0),
            port: Some(8080),
            ..Default::default()
        };
        let file_config = ConfigOverrides {
            threshold: Some(30.0),
            port: Some(9000),
            min_scene_len: Some(5),
            log_level: Some("debug".to_string()),
        };

        let config = ConfigLoader::merge(cli, env_config, file_config).unwrap();
        assert_eq!(config.detection.threshold, 10.0);
        assert_eq!(config.port, 8080);
        assert_eq!(config.detection.min_scene_len, 5);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let cli = ConfigOverrides {
            threshold: Some(-1.0),
            ..Default::default()
        };
        assert!(ConfigLoader::merge(cli, ConfigOverrides::default(), ConfigOverrides::default()).is_err());
    }

    #[test]
    fn test_env_lookup() {
        let overrides = ConfigOverrides::from_lookup(lookup_from(&[
            ("PORT", "6001"),
            ("SHOT_DETECTION_THRESHOLD", "31.5"),
            ("SHOT_DETECTION_MIN_SCENE_LEN", " 8 "),
        ]))
        .unwrap();

        assert_eq!(overrides.port, Some(6001));
        assert_eq!(overrides.threshold, Some(31.5));
        assert_eq!(overrides.min_scene_len, Some(8));
        assert_eq!(overrides.log_level, None);
    }

    #[test]
    fn test_invalid_detection_env_is_an_error() {
        let err = ConfigOverrides::from_lookup(lookup_from(&[("SHOT_DETECTION_THRESHOLD", "27,5")])).unwrap_err();
        assert!(err.to_string().contains("SHOT_DETECTION_THRESHOLD"), "{}", err);

        let err = ConfigOverrides::from_lookup(lookup_from(&[("SHOT_DETECTION_MIN_SCENE_LEN", "not-a-number")])).unwrap_err();
        assert!(err.to_string().contains("SHOT_DETECTION_MIN_SCENE_LEN"), "{}", err);
    }

    #[test]
    fn test_invalid_port_env_is_an_error() {
        let result = ConfigOverrides::from_lookup(lookup_from(&[("PORT", "fifty")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_default_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        ConfigLoader::create_default_config(&path).unwrap();
        let file_config = ConfigLoader::load_from_file(&path).unwrap();

        assert_eq!(file_config.threshold, Some(27.0));
        assert_eq!(file_config.min_scene_len, Some(15));
        assert_eq!(file_config.port, Some(5000));
        assert_eq!(file_config.log_level.as_deref(), Some("info"));
    }

    #[test]
    fn test_default_section_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.ini");
        std::fs::write(&path, "[DEFAULT]\nthreshold = 35\nport = 7000\n").unwrap();

        let file_config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(file_config.threshold, Some(35.0));
        assert_eq!(file_config.port, Some(7000));
        assert_eq!(file_config.min_scene_len, None);
    }

    #[test]
    fn test_missing_explicit_config_file() {
        let result = ConfigLoader::load(Some(Path::new("/no/such/shot-detection.ini")), ConfigOverrides::default());
        assert!(result.is_err());
    }
}
