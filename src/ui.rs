//! Interface de terminal do jobyard — barras de progresso e saída colorida.
//!
//! Usa as crates `indicatif` para as barras de progresso e `console` para
//! estilização com cores. O [`JobsProgress`] acompanha a coleta de resultados
//! do runner local; o [`WaitProgress`] exibe percentual e tempo restante
//! durante a espera por tarefas remotas.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::local::JobResult;
use crate::remote::{ProgressReporter, ProgressSnapshot, RemoteTask, WaitError};

/// Barra de progresso da coleta de resultados de jobs locais.
pub struct JobsProgress {
    // Barra de progresso do indicatif, um passo por resultado coletado.
    pb: ProgressBar,
    // Estilo verde para jobs sem erros.
    green: Style,
    // Estilo vermelho para jobs com erros.
    red: Style,
}

impl JobsProgress {
    /// Inicia a barra com o total de jobs submetidos.
    pub fn start(total: usize) -> Self {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} jobs {msg}")
                .expect("invalid template")
                .progress_chars("=> "),
        );
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
        }
    }

    /// Registra um resultado coletado e imprime seu resumo.
    pub fn record(&self, result: &JobResult) {
        self.pb.inc(1);
        if result.has_errors() {
            for error in &result.errors {
                self.pb
                    .println(format!("  {} job {}: {error}", self.red.apply_to("✗"), result.id));
            }
        } else {
            let output = serde_json::to_string(&result.output).unwrap_or_default();
            self.pb.println(format!(
                "  {} job {} ({}ms): {output}",
                self.green.apply_to("✓"),
                result.id,
                result.duration_ms
            ));
        }
    }

    /// Finaliza a barra e exibe o total de falhas.
    pub fn complete(&self, failed: usize) {
        self.pb.finish_and_clear();
        if failed == 0 {
            println!("  {} all jobs completed", self.green.apply_to("✓"));
        } else {
            println!("  {} {failed} job(s) reported errors", self.red.apply_to("✗"));
        }
    }
}

/// Barra de percentual e tempo estimado para a espera de tarefas remotas.
///
/// É `Clone`: uma cópia vai para o waiter como [`ProgressReporter`] e a outra
/// fica com quem imprime os resultados, ambas sobre a mesma barra.
#[derive(Clone)]
pub struct WaitProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl WaitProgress {
    pub fn start(title: &str) -> Self {
        let pb = ProgressBar::new(100);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} {prefix} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
                .expect("invalid template")
                .progress_chars("=> "),
        );
        pb.set_prefix(title.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Imprime uma tarefa que chegou a um estado terminal.
    pub fn task_finished(&self, task: &RemoteTask) {
        if task.failed() {
            let reason = task.error_text.as_deref().unwrap_or("no error text");
            self.pb.println(format!(
                "  {} {} {}: {reason}",
                self.red.apply_to("✗"),
                task.path,
                task.state
            ));
        } else {
            let output = task.output_path.as_deref().unwrap_or("-");
            self.pb.println(format!(
                "  {} {} {} → {output}",
                self.green.apply_to("✓"),
                task.path,
                task.state
            ));
        }
    }

    /// Imprime um handle que não pôde ser resolvido.
    pub fn task_skipped(&self, err: &WaitError) {
        self.pb
            .println(format!("  {} {err}", self.yellow.apply_to("!")));
    }
}

impl ProgressReporter for WaitProgress {
    fn report(&self, _title: &str, snapshot: &ProgressSnapshot) {
        self.pb
            .set_position(snapshot.estimate.percent_complete.round().clamp(0.0, 100.0) as u64);
        let eta = match snapshot.estimate.remaining {
            Some(remaining) => format!("~{}s remaining", remaining.as_secs()),
            None => "estimating...".to_string(),
        };
        self.pb.set_message(format!(
            "{}/{} done, {eta}",
            snapshot.completed, snapshot.total
        ));
    }

    fn finish(&self) {
        self.pb.finish_and_clear();
    }
}
