use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use passage_retrieve::bm25::ScoreMode;
use passage_retrieve::rerank::{Fusion, Normalisation};
use passage_retrieve_cli::{
    run_index_build, run_index_merge, run_rerank, run_search, IndexBuildArgs, IndexMergeArgs,
    RerankArgs, SearchArgs,
};

#[derive(Parser)]
#[command(name = "passage-retrieve", author, version, about, long_about = None)]
#[command(rename_all = "snake_case")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
#[command(rename_all = "snake_case")]
enum Command {
    /// Stream a collection and spill sorted runs + the doclen sidecar.
    #[command(rename_all = "snake_case")]
    IndexBuild {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        outdir: PathBuf,
        #[arg(long, default_value_t = 100_000)]
        batch_docs: usize,
    },
    /// K-way merge run files into the final postings + lexicon.
    #[command(rename_all = "snake_case")]
    IndexMerge {
        #[arg(long)]
        run_dir: PathBuf,
        #[arg(long)]
        out_dir: PathBuf,
    },
    /// Score a query file against an index and emit a BM25 TREC run.
    #[command(rename_all = "snake_case")]
    Search {
        #[arg(long)]
        index_dir: PathBuf,
        #[arg(long)]
        queries: PathBuf,
        #[arg(long)]
        run_out: PathBuf,
        #[arg(long, default_value_t = 0.9)]
        k1: f32,
        #[arg(long, default_value_t = 0.4)]
        b: f32,
        #[arg(long, value_enum, default_value_t = CliScoreMode::Disj)]
        mode: CliScoreMode,
        #[arg(long, default_value_t = 1000)]
        topk: usize,
        #[arg(long)]
        page_table: Option<PathBuf>,
    },
    /// Re-rank a BM25 run by dense dot-product similarity, optionally
    /// fused with the normalised BM25 score.
    #[command(rename_all = "snake_case")]
    Rerank {
        #[arg(long)]
        bm25_run: PathBuf,
        #[arg(long)]
        query_h5: PathBuf,
        #[arg(long)]
        passage_h5: PathBuf,
        #[arg(long)]
        qid_list: Option<PathBuf>,
        #[arg(long, default_value_t = 1000)]
        topk_in: usize,
        #[arg(long, default_value_t = 100)]
        topk_out: usize,
        #[arg(long, value_enum, default_value_t = CliFusion::Dense)]
        fusion: CliFusion,
        #[arg(long, default_value_t = 0.5)]
        alpha: f64,
        #[arg(long, value_enum, default_value_t = CliNorm::None)]
        norm_dense: CliNorm,
        #[arg(long, value_enum, default_value_t = CliNorm::None)]
        norm_bm25: CliNorm,
        #[arg(long)]
        run_out: PathBuf,
        #[arg(long, default_value = "rerank")]
        tag: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CliScoreMode {
    Disj,
    Conj,
}

impl From<CliScoreMode> for ScoreMode {
    fn from(m: CliScoreMode) -> Self {
        match m {
            CliScoreMode::Disj => ScoreMode::Disjunctive,
            CliScoreMode::Conj => ScoreMode::Conjunctive,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum CliFusion {
    Dense,
    Linear,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliNorm {
    None,
    Minmax,
    Zscore,
}

impl From<CliNorm> for Normalisation {
    fn from(n: CliNorm) -> Self {
        match n {
            CliNorm::None => Normalisation::None,
            CliNorm::Minmax => Normalisation::MinMax,
            CliNorm::Zscore => Normalisation::ZScore,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::IndexBuild { input, outdir, batch_docs } => {
            run_index_build(IndexBuildArgs { input, outdir, batch_docs })
        }
        Command::IndexMerge { run_dir, out_dir } => run_index_merge(IndexMergeArgs { run_dir, out_dir }),
        Command::Search { index_dir, queries, run_out, k1, b, mode, topk, page_table } => {
            run_search(SearchArgs {
                index_dir,
                queries,
                run_out,
                k1,
                b,
                mode: mode.into(),
                topk,
                page_table,
            })
        }
        Command::Rerank {
            bm25_run,
            query_h5,
            passage_h5,
            qid_list,
            topk_in,
            topk_out,
            fusion,
            alpha,
            norm_dense,
            norm_bm25,
            run_out,
            tag,
        } => run_rerank(RerankArgs {
            bm25_run,
            query_h5,
            passage_h5,
            qid_list,
            topk_in,
            topk_out,
            fusion: match fusion {
                CliFusion::Dense => Fusion::Dense,
                CliFusion::Linear => Fusion::Linear { alpha },
            },
            norm_dense: norm_dense.into(),
            norm_bm25: norm_bm25.into(),
            run_out,
            tag,
        }),
    };

    if let Err(err) = result {
        eprintln!("[ERR] {err:#}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
