//! Configuração do jobyard carregada a partir de `jobyard.toml`.
//!
//! A struct [`JobyardConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `JOBYARD_POOL_SIZE` tem precedência sobre o arquivo.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::JobyardError;
use crate::local::RunnerOptions;
use crate::remote::{RetryPolicy, WaitOptions};

/// Nome do arquivo procurado no diretório atual.
pub const CONFIG_FILE: &str = "jobyard.toml";

/// Configuração de nível superior carregada de `jobyard.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobyardConfig {
    /// Número máximo de jobs executando ao mesmo tempo.
    /// Ausente: número de processadores lógicos.
    #[serde(default)]
    pub max_pool_size: Option<usize>,

    /// Intervalo de verificação do runner local, em milissegundos.
    #[serde(default = "default_job_poll_interval_ms")]
    pub job_poll_interval_ms: u64,

    /// Módulos pré-carregados em todo contexto de execução.
    #[serde(default)]
    pub modules: Vec<String>,

    /// Intervalo entre rodadas de consulta às tarefas remotas, em milissegundos.
    #[serde(default = "default_task_poll_interval_ms")]
    pub task_poll_interval_ms: u64,

    /// Tentativas por consulta antes de desistir por falha de comunicação.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pausa fixa entre tentativas, em milissegundos.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Solicita limpeza remota de cada tarefa concluída.
    #[serde(default)]
    pub cleanup: bool,

    /// Filtro de log usado quando `RUST_LOG` não está definido.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Valor padrão do intervalo do runner local: 1000ms.
fn default_job_poll_interval_ms() -> u64 {
    1000
}

// Valor padrão do intervalo de consulta remota: 500ms.
fn default_task_poll_interval_ms() -> u64 {
    500
}

// Valor padrão para tentativas por consulta: 5.
fn default_max_attempts() -> u32 {
    5
}

// Valor padrão para a pausa entre tentativas: 2000ms.
fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for JobyardConfig {
    fn default() -> Self {
        Self {
            max_pool_size: None,
            job_poll_interval_ms: default_job_poll_interval_ms(),
            modules: Vec::new(),
            task_poll_interval_ms: default_task_poll_interval_ms(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            cleanup: false,
            log_level: default_log_level(),
        }
    }
}

impl JobyardConfig {
    /// Carrega a configuração de `jobyard.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self, JobyardError> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Carrega a configuração de um caminho explícito, com os mesmos
    /// defaults e precedência de ambiente de [`load`](Self::load).
    pub fn load_from(path: &Path) -> Result<Self, JobyardError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<JobyardConfig>(&contents)?
        } else {
            Self::default()
        };

        // Variável de ambiente tem precedência sobre o arquivo de configuração.
        if let Ok(value) = std::env::var("JOBYARD_POOL_SIZE")
            && !value.is_empty()
        {
            let size = value.parse::<usize>().map_err(|e| {
                JobyardError::Config(format!("JOBYARD_POOL_SIZE={value}: {e}"))
            })?;
            config.max_pool_size = Some(size);
        }

        config.validate()?;
        Ok(config)
    }

    /// Rejeita valores que tornariam o runner ou a espera inutilizáveis.
    pub fn validate(&self) -> Result<(), JobyardError> {
        if self.max_pool_size == Some(0) {
            return Err(JobyardError::Config("max_pool_size must be at least 1".into()));
        }
        if self.job_poll_interval_ms == 0 {
            return Err(JobyardError::Config("job_poll_interval_ms must be greater than zero".into()));
        }
        if self.max_attempts == 0 {
            return Err(JobyardError::Config("max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            max_pool_size: self.max_pool_size,
            poll_interval: Duration::from_millis(self.job_poll_interval_ms),
            modules: self.modules.clone(),
            ..Default::default()
        }
    }

    /// Opções de espera; `cleanup` da CLI soma-se ao valor do arquivo.
    pub fn wait_options(&self, title: &str, cleanup: bool) -> WaitOptions {
        WaitOptions {
            title: title.to_string(),
            cleanup: cleanup || self.cleanup,
            poll_interval: Duration::from_millis(self.task_poll_interval_ms),
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                delay_ms: self.retry_delay_ms,
            },
            ..Default::default()
        }
    }

    pub fn to_pretty_json(&self) -> Result<String, JobyardError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
