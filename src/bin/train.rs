use clap::Parser;
use conv_baselines::util::{run_training, RunConfig, TrainArgs};

fn main() -> anyhow::Result<()> {
    let args = TrainArgs::parse();
    let cfg = RunConfig::from_args(args)?;
    run_training(&cfg)
}
