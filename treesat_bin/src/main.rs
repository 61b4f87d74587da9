use clap::{Parser, ValueEnum};
use log::{error, info};
use std::error::Error;
use std::fs::{self, File};
use std::io::{stdout, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use treesat::backend::CpuBackend;
use treesat::parser::{build_decomposition, build_formula};
use treesat::{SolveReport, Solver, SolverConfig, TableStrategy};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "treesat", version, arg_required_else_help(true))]
struct Cli {
    /// Formula in the DIMACS CNF format, stdin when not given.
    /// Weights are read from "w L W [0]" and "c p weight L W 0" lines.
    #[arg(short, long, verbatim_doc_comment)]
    formula: Option<PathBuf>,

    /// Tree decomposition of the primal graph in the PACE format.
    /// The decomposition is rooted at bag 1.
    #[arg(short, long, verbatim_doc_comment)]
    decomposition: PathBuf,

    /// Output path, stdout when not given.
    #[arg(short, long, verbatim_doc_comment)]
    output: Option<PathBuf>,

    /// How solution tables are stored.
    /// "auto" uses dense tables as long as a whole table fits into a single buffer.
    #[arg(short, long, value_enum, default_value_t = Table::Auto, verbatim_doc_comment)]
    table: Table,

    /// The bytes of device memory a run may use.
    #[arg(long, default_value_t = 1 << 30, verbatim_doc_comment)]
    memory_size: usize,

    /// The bytes a single output buffer may occupy.
    /// Larger tables are computed in several chunks.
    #[arg(long, default_value_t = 1 << 28, verbatim_doc_comment)]
    max_memory_buffer: usize,

    /// Count weighted models with the literal weights of the formula.
    #[arg(short, long, verbatim_doc_comment)]
    weighted: bool,

    /// Merges chains of bags with a single child while their union has at most
    /// this many variables.
    #[arg(short, long, verbatim_doc_comment)]
    combine_width: Option<usize>,

    /// Specify how many threads should be used.
    /// Possible values are between 1 and 32.
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..=32), default_value_t = 1, verbatim_doc_comment)]
    jobs: u16,

    /// Print the result and the statistics of the run as JSON.
    #[arg(long, verbatim_doc_comment)]
    json: bool,

    /// Save the decomposition the solver works on in the PACE format.
    #[arg(long, verbatim_doc_comment)]
    save_decomposition: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Table {
    Dense,
    Sparse,
    Auto,
}

impl From<Table> for TableStrategy {
    fn from(table: Table) -> Self {
        match table {
            Table::Dense => TableStrategy::Dense,
            Table::Sparse => TableStrategy::Sparse,
            Table::Auto => TableStrategy::Auto,
        }
    }
}

fn main() -> ExitCode {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(report) if report.satisfiable => ExitCode::from(10),
        Ok(_) => ExitCode::from(20),
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<SolveReport, Box<dyn Error>> {
    let time = Instant::now();

    let formula = build_formula(cli.formula.as_deref())?;
    let decomposition = build_decomposition(&cli.decomposition, cli.combine_width)?;
    info!(
        "Parsed {} clauses and {} bags of width at most {} in {:.3}s.",
        formula.clauses.len(),
        decomposition.len(),
        decomposition.width(),
        time.elapsed().as_secs_f32()
    );

    if let Some(path) = &cli.save_decomposition {
        fs::write(path, decomposition.to_string())?;
        info!(
            "The decomposition was written into the PACE format in {}.",
            path.display()
        );
    }

    let config = SolverConfig {
        memory_size: cli.memory_size,
        max_memory_buffer: cli.max_memory_buffer,
        strategy: cli.table.into(),
        weighted: cli.weighted,
    };
    let solver = Solver::new(config, CpuBackend::new(cli.jobs));

    let time = Instant::now();
    let report = solver.solve(&formula, &decomposition)?;
    info!(
        "Elapsed time for solving in seconds: {:.3}s.",
        time.elapsed().as_secs_f32()
    );

    let mut writer: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(stdout())),
    };
    if cli.json {
        serde_json::to_writer_pretty(&mut writer, &report)?;
        writeln!(writer)?;
    } else {
        write_report(&mut writer, &report, cli.weighted)?;
    }
    writer.flush()?;

    if let Some(path) = &cli.output {
        info!("The result was written into {}.", path.display());
    }
    Ok(report)
}

// Writes the result in the style of model counting competitions.
fn write_report(
    writer: &mut impl Write,
    report: &SolveReport,
    weighted: bool,
) -> std::io::Result<()> {
    if report.satisfiable {
        writeln!(writer, "s SATISFIABLE")?;
    } else {
        writeln!(writer, "s UNSATISFIABLE")?;
    }

    match report.exact_count() {
        Some(count) if !weighted => writeln!(writer, "c model count {count}")?,
        _ => writeln!(writer, "c model count {}", report.model_count)?,
    }
    if let Some(overflow) = report.overflow {
        writeln!(writer, "c overflow at bag {}", overflow.bag)?;
    }

    let statistics = &report.statistics;
    writeln!(writer, "c joins {}", statistics.joins)?;
    writeln!(writer, "c introduce-forgets {}", statistics.introduce_forgets)?;
    writeln!(writer, "c dispatches {}", statistics.dispatches)?;
    writeln!(writer, "c max table size {}", statistics.max_table_size)?;
    writeln!(writer, "c peak live bytes {}", statistics.peak_live_bytes)?;
    writeln!(writer, "c peak device bytes {}", statistics.peak_device_bytes)
}
