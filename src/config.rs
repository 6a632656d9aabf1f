use std::ffi::OsStr;
use std::fs::File;

use justconfig::item::ValueExtractor;
use justconfig::processors::Trim;
use justconfig::sources::env::Env;
use justconfig::sources::text::ConfigText;
use justconfig::ConfPath;
use justconfig::Config;

// Set some default values
// A vector_size of 0 means "infer the dimension from the vector file".
const DEFAULT_VECTOR_SIZE: usize = 0;
const DEFAULT_WINDOW: usize = 5;
const DEFAULT_MIN_COUNT: usize = 1;
const DEFAULT_NUM_NEIGHBORS_K: usize = 1;

pub struct AppConfig {
    pub data: DataConfig,
    pub model: ModelConfig,
    pub query: QueryConfig,
}

pub struct DataConfig {
    pub corpus_path: String,
    pub vectors_path: String,
    pub model_path: String,
}

pub struct ModelConfig {
    pub vector_size: usize,
    pub window: usize,
    pub min_count: usize,
}

pub struct QueryConfig {
    pub test_path: String,
    pub output_path: String,
    pub num_neighbors_k: usize,
    pub target_behavior: Option<String>,
}

impl AppConfig {
    pub fn new(config_path: String) -> AppConfig {
        // Initialize config object
        let mut conf = Config::default();

        // Check if there is a config file
        if let Ok(config_file) = File::open(&config_path) {
            let config_text = ConfigText::new(config_file, &config_path)
                .expect("Loading configuration file failed.");
            conf.add_source(config_text);
        }

        // Define config params from environment variables
        let config_env = Env::new(&[
            (
                ConfPath::from(&["data", "corpus_path"]),
                OsStr::new("CORPUS_DATA"),
            ),
            (
                ConfPath::from(&["data", "vectors_path"]),
                OsStr::new("VECTOR_DATA"),
            ),
            (
                ConfPath::from(&["data", "model_path"]),
                OsStr::new("MODEL_FILE"),
            ),
        ]);
        conf.add_source(config_env);

        // Parse into custom config struct
        AppConfig::parse(conf)
    }

    fn parse(conf: justconfig::Config) -> AppConfig {
        AppConfig {
            data: DataConfig::parse(&conf, ConfPath::from(&["data"])),
            model: ModelConfig::parse(&conf, ConfPath::from(&["model"])),
            query: QueryConfig::parse(&conf, ConfPath::from(&["query"])),
        }
    }
}

impl DataConfig {
    fn parse(conf: &Config, path: ConfPath) -> DataConfig {
        DataConfig {
            corpus_path: conf
                .get(path.push("corpus_path"))
                .trim()
                .value()
                .unwrap_or_default(),
            vectors_path: conf
                .get(path.push("vectors_path"))
                .trim()
                .value()
                .unwrap_or_default(),
            model_path: conf
                .get(path.push("model_path"))
                .trim()
                .value()
                .unwrap_or_default(),
        }
    }
}

impl ModelConfig {
    fn parse(conf: &Config, path: ConfPath) -> ModelConfig {
        ModelConfig {
            vector_size: conf
                .get(path.push("vector_size"))
                .trim()
                .value()
                .unwrap_or(DEFAULT_VECTOR_SIZE),
            window: conf
                .get(path.push("window"))
                .trim()
                .value()
                .unwrap_or(DEFAULT_WINDOW),
            min_count: conf
                .get(path.push("min_count"))
                .trim()
                .value()
                .unwrap_or(DEFAULT_MIN_COUNT),
        }
    }
}

impl QueryConfig {
    fn parse(conf: &Config, path: ConfPath) -> QueryConfig {
        QueryConfig {
            test_path: conf
                .get(path.push("test_path"))
                .trim()
                .value()
                .unwrap_or_default(),
            output_path: conf
                .get(path.push("output_path"))
                .trim()
                .value()
                .unwrap_or_default(),
            num_neighbors_k: conf
                .get(path.push("num_neighbors_k"))
                .trim()
                .value()
                .unwrap_or(DEFAULT_NUM_NEIGHBORS_K),
            target_behavior: conf
                .get(path.push("target_behavior"))
                .trim()
                .value()
                .ok(),
        }
    }
}
