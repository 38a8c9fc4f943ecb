//! Interface de linha de comando do jobyard baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (jobs, tasks, config)
//! e flags globais (--pool-size, --config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// jobyard — runner local de jobs com pool limitado e espera de tarefas remotas.
#[derive(Debug, Parser)]
#[command(name = "jobyard", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Tamanho máximo do pool de workers (padrão: processadores lógicos).
    #[arg(long, global = true)]
    pub pool_size: Option<usize>,

    /// Caminho alternativo para o arquivo de configuração.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Executa jobs sintéticos no runner local e coleta os resultados.
    Jobs {
        /// Quantidade de jobs a submeter.
        #[arg(long, default_value_t = 8)]
        count: usize,

        /// Duração de cada job em milissegundos.
        #[arg(long, default_value_t = 250)]
        sleep_ms: u64,

        /// Faz falhar todo N-ésimo job.
        #[arg(long)]
        fail_every: Option<usize>,
    },

    /// Aguarda tarefas remotas simuladas até um estado terminal.
    Tasks {
        /// Quantidade de tarefas a aguardar.
        #[arg(long, default_value_t = 3)]
        count: usize,

        /// Consultas necessárias para cada tarefa terminar.
        #[arg(long, default_value_t = 6, value_parser = clap::value_parser!(u32).range(1..=10_000))]
        polls: u32,

        /// Título exibido na barra de progresso.
        #[arg(long, default_value = "Waiting for tasks")]
        title: String,

        /// Solicita limpeza remota de cada tarefa concluída.
        #[arg(long, default_value_t = false)]
        cleanup: bool,

        /// Simula N falhas de comunicação antes da primeira resposta.
        #[arg(long, default_value_t = 0)]
        fail_first: u32,
    },

    /// Mostra a configuração efetiva em JSON.
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_jobs_subcommand() {
        let cli = Cli::parse_from(["jobyard", "jobs", "--count", "5", "--fail-every", "2"]);
        match cli.command {
            Command::Jobs {
                count,
                sleep_ms,
                fail_every,
            } => {
                assert_eq!(count, 5);
                assert_eq!(sleep_ms, 250);
                assert_eq!(fail_every, Some(2));
            }
            _ => panic!("expected Jobs command"),
        }
    }

    #[test]
    fn cli_parses_tasks_subcommand() {
        let cli = Cli::parse_from(["jobyard", "tasks", "--cleanup", "--title", "Exporting"]);
        match cli.command {
            Command::Tasks {
                count,
                title,
                cleanup,
                fail_first,
                ..
            } => {
                assert_eq!(count, 3);
                assert_eq!(title, "Exporting");
                assert!(cleanup);
                assert_eq!(fail_first, 0);
            }
            _ => panic!("expected Tasks command"),
        }
    }

    #[test]
    fn cli_rejects_out_of_range_polls() {
        assert!(Cli::try_parse_from(["jobyard", "tasks", "--polls", "0"]).is_err());
        assert!(Cli::try_parse_from(["jobyard", "tasks", "--polls", "4294967295"]).is_err());
        let cli = Cli::parse_from(["jobyard", "tasks", "--polls", "10000"]);
        assert!(matches!(cli.command, Command::Tasks { polls: 10_000, .. }));
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from(["jobyard", "--pool-size", "2", "--verbose", "config"]);
        assert!(cli.verbose);
        assert_eq!(cli.pool_size, Some(2));
        assert!(matches!(cli.command, Command::Config));
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
