use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, bail, Context};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::Serialize;
use structopt::StructOpt;

use acoustic_model::allophone::AllophoneState;
use acoustic_model::cart::DecisionTree;
use acoustic_model::fsa::AlphabetKind;
use acoustic_model::lexicon::Coarticulated;
use acoustic_model::state_tying::{standard_property_map, StateTying};
use acoustic_model::types::{Label, PhonemeId};
use acoustic_model::{AcousticModel, AcousticModelConfig, Lexicon, StaticAutomaton, TransducerBuilder};

#[derive(Debug, StructOpt)]
struct ModelOpts {
    #[structopt(short, long, parse(from_os_str), help = "Acoustic model configuration (JSON)")]
    config: Option<PathBuf>,

    #[structopt(short, long, parse(from_os_str), help = "Pronunciation lexicon (XML)")]
    lexicon: PathBuf,
}

#[derive(Debug, StructOpt)]
#[structopt(
    name = "am-tools",
    about = "Inspect acoustic models and build state-model transducers."
)]
enum Opts {
    #[structopt(about = "List the allophone alphabet")]
    Allophones {
        #[structopt(flatten)]
        model: ModelOpts,

        #[structopt(short, long, parse(from_os_str), help = "Store the alphabet to this file")]
        output: Option<PathBuf>,
    },

    #[structopt(about = "Classify every allophone state and write a CSV table")]
    Tying {
        #[structopt(flatten)]
        model: ModelOpts,

        #[structopt(short, long, parse(from_os_str))]
        output: PathBuf,
    },

    #[structopt(about = "Build a transducer and write it in AT&T format")]
    Transducer {
        #[structopt(flatten)]
        model: ModelOpts,

        #[structopt(
            short,
            long,
            possible_values = &["phoneme-loop", "allophone-loop", "emission-loop", "context-dependency", "pronunciation"],
        )]
        kind: TransducerKind,

        #[structopt(
            short,
            long,
            default_value = "allophone-states",
            possible_values = &["allophones", "allophone-states", "emissions"],
        )]
        input: InputKind,

        #[structopt(short, long, default_value = "0")]
        disambiguators: u32,

        #[structopt(long, help = "Apply the transition model")]
        transition_model: bool,

        #[structopt(long, help = "Phonemes of the pronunciation transducer, space separated")]
        pronunciation: Option<String>,

        #[structopt(long, default_value = "0", help = "Offset of the first phoneme in context-dependency transducers")]
        initial_phone_offset: u32,

        #[structopt(short, long, parse(from_os_str))]
        output: Option<PathBuf>,
    },

    #[structopt(about = "Print the dependency set of a model as JSON")]
    Dependencies {
        #[structopt(flatten)]
        model: ModelOpts,
    },

    #[structopt(about = "Show the decision tree questions that classify allophone states")]
    Explain {
        #[structopt(flatten)]
        model: ModelOpts,

        #[structopt(help = "Allophone states such as `a{#+b}@i.0`")]
        states: Vec<String>,
    },

    #[structopt(about = "Prune a decision tree to a maximum number of leaves")]
    PruneTree {
        #[structopt(flatten)]
        model: ModelOpts,

        #[structopt(parse(from_os_str))]
        tree: PathBuf,

        #[structopt(short, long)]
        max_leaves: usize,

        #[structopt(short, long, parse(from_os_str))]
        output: PathBuf,
    },
}

#[derive(Debug, Clone, Copy)]
enum TransducerKind {
    PhonemeLoop,
    AllophoneLoop,
    EmissionLoop,
    ContextDependency,
    Pronunciation,
}

impl FromStr for TransducerKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "phoneme-loop" => Ok(TransducerKind::PhonemeLoop),
            "allophone-loop" => Ok(TransducerKind::AllophoneLoop),
            "emission-loop" => Ok(TransducerKind::EmissionLoop),
            "context-dependency" => Ok(TransducerKind::ContextDependency),
            "pronunciation" => Ok(TransducerKind::Pronunciation),
            _ => Err(anyhow!("unknown transducer kind `{}`", s)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum InputKind {
    Allophones,
    AllophoneStates,
    Emissions,
}

impl FromStr for InputKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allophones" => Ok(InputKind::Allophones),
            "allophone-states" => Ok(InputKind::AllophoneStates),
            "emissions" => Ok(InputKind::Emissions),
            _ => Err(anyhow!("unknown input alphabet `{}`", s)),
        }
    }
}

#[derive(Serialize)]
struct TyingRow {
    state: String,
    allophone: u32,
    emission: u32,
}

fn load_model(opts: &ModelOpts) -> anyhow::Result<AcousticModel> {
    let config = match &opts.config {
        Some(path) => AcousticModelConfig::from_path(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => AcousticModelConfig::default(),
    };
    let lexicon = Lexicon::from_path(&opts.lexicon)
        .with_context(|| format!("loading lexicon {}", opts.lexicon.display()))?;
    Ok(AcousticModel::build(&config, lexicon)?)
}

fn writer(path: Option<&Path>) -> anyhow::Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(std::io::stdout())),
    })
}

fn symbol(am: &AcousticModel, kind: AlphabetKind, label: Label) -> String {
    if label.is_epsilon() {
        return label.to_string();
    }
    if let Some(d) = label.disambiguator_number() {
        return format!("#{}", d);
    }
    match kind {
        AlphabetKind::Phonemes => am
            .lexicon()
            .phoneme_inventory()
            .symbol(PhonemeId::new(label.value() as u16))
            .to_string(),
        AlphabetKind::Allophones => am.allophone_alphabet().symbol(label),
        AlphabetKind::AllophoneStates => am.allophone_state_alphabet().symbol(label),
        AlphabetKind::Emissions => label.to_string(),
    }
}

fn list_allophones(model: &ModelOpts, output: Option<&Path>) -> anyhow::Result<()> {
    let am = load_model(model)?;
    let alphabet = am.allophone_alphabet();
    match output {
        Some(path) => {
            alphabet.store(path)?;
            println!("Wrote {} allophones to {:?}.", alphabet.len(), path);
        }
        None => {
            let mut out = writer(None)?;
            for (i, allophone) in alphabet.allophones().iter().enumerate() {
                writeln!(out, "{}\t{}", i, alphabet.format(allophone))?;
            }
            out.flush()?;
        }
    }
    Ok(())
}

fn write_tying(model: &ModelOpts, output: &Path) -> anyhow::Result<()> {
    let am = load_model(model)?;
    let states: Vec<AllophoneState> = am.allophone_state_alphabet().allophone_states().collect();

    let pb = ProgressBar::new(states.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{pos}/{len} [{percent}%] {wide_bar} {elapsed_precise}"),
    );

    let tying = am.state_tying();
    let rows = states
        .par_iter()
        .progress_with(pb)
        .map(|state| TyingRow {
            state: am.allophone_state_alphabet().format(state),
            allophone: state.allophone_index().value(),
            emission: tying.classify(state).value(),
        })
        .collect::<Vec<_>>();

    let mut table = csv::WriterBuilder::new().delimiter(b'\t').from_path(output)?;
    for row in rows.iter() {
        table.serialize(row)?;
    }
    table.flush()?;
    println!(
        "Wrote {} allophone states in {} classes to {:?}.",
        rows.len(),
        am.emission_count(),
        output
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn build_transducer(
    model: &ModelOpts,
    kind: TransducerKind,
    input: InputKind,
    disambiguators: u32,
    transition_model: bool,
    pronunciation: Option<&str>,
    initial_phone_offset: u32,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let am = load_model(model)?;
    let mut builder = TransducerBuilder::new(&am);
    builder.set_disambiguators(disambiguators);
    match input {
        InputKind::Allophones => builder.select_allophones_as_input(),
        InputKind::AllophoneStates => builder.select_allophone_states_as_input(),
        InputKind::Emissions => builder.select_emission_labels_as_input(),
    };
    if transition_model {
        builder.select_transition_model();
    } else {
        builder.select_flat_model();
    }

    let automaton: StaticAutomaton = match kind {
        TransducerKind::PhonemeLoop => builder.create_phoneme_loop_transducer()?,
        TransducerKind::AllophoneLoop => builder.create_allophone_loop_transducer()?,
        TransducerKind::EmissionLoop => builder.create_emission_loop_transducer(transition_model)?,
        TransducerKind::ContextDependency => {
            builder.create_minimized_context_dependency_transducer(initial_phone_offset)?
        }
        TransducerKind::Pronunciation => {
            let text = match pronunciation {
                Some(text) => text,
                None => bail!("--pronunciation is required for pronunciation transducers"),
            };
            let pronunciation = am.lexicon().parse_pronunciation(text)?;
            builder.create_pronunciation_transducer(&Coarticulated::new(pronunciation))?
        }
    };
    log::info!(
        "{:?} transducer: {} states, {} arcs, {} final states",
        kind,
        automaton.n_states(),
        automaton.n_transitions(),
        automaton.n_final_states()
    );

    let (input, output_kind) = (automaton.input_alphabet(), automaton.output_alphabet());
    let mut out = writer(output)?;
    automaton.write_att(
        &mut out,
        |l| symbol(&am, input, l),
        |l| symbol(&am, output_kind, l),
    )?;
    out.flush()?;
    Ok(())
}

fn print_dependencies(model: &ModelOpts) -> anyhow::Result<()> {
    let am = load_model(model)?;
    println!("{}", serde_json::to_string_pretty(&am.dependencies())?);
    Ok(())
}

fn explain_states(model: &ModelOpts, states: &[String]) -> anyhow::Result<()> {
    let am = load_model(model)?;
    let tying = match am.state_tying().tying() {
        StateTying::DecisionTree(tying) => tying,
        other => bail!("{:?} state tying has no decision tree", other.kind()),
    };
    let alphabet = am.allophone_state_alphabet();
    for symbol in states {
        let (allophone, state) = alphabet.parse(symbol)?;
        let state = alphabet.allophone_state(alphabet.index_or_insert(&allophone, state)?);
        let (steps, classes) = tying.explain(&state);
        println!("{}", symbol);
        for (question, answer) in steps {
            println!("  {} {:?}", question, answer);
        }
        println!("  -> {}", classes.iter().map(|c| c.value().to_string()).collect::<Vec<_>>().join(" "));
    }
    Ok(())
}

fn prune_tree(model: &ModelOpts, tree: &Path, max_leaves: usize, output: &Path) -> anyhow::Result<()> {
    let am = load_model(model)?;
    let map = standard_property_map(am.state_model());
    let mut tree = DecisionTree::from_path(tree, &map)?;
    let before = tree.n_leaves();
    let renumbered = tree.prune(max_leaves);
    println!(
        "Pruned {} leaves to {} ({} leaf ids mapped).",
        before,
        tree.n_leaves(),
        renumbered.len()
    );
    std::fs::write(output, tree.to_json()?)?;
    println!("Wrote to {:?}.", output);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let opts = Opts::from_args();

    match opts {
        Opts::Allophones { model, output } => list_allophones(&model, output.as_deref()),
        Opts::Tying { model, output } => write_tying(&model, &output),
        Opts::Transducer {
            model,
            kind,
            input,
            disambiguators,
            transition_model,
            pronunciation,
            initial_phone_offset,
            output,
        } => build_transducer(
            &model,
            kind,
            input,
            disambiguators,
            transition_model,
            pronunciation.as_deref(),
            initial_phone_offset,
            output.as_deref(),
        ),
        Opts::Dependencies { model } => print_dependencies(&model),
        Opts::Explain { model, states } => explain_states(&model, &states),
        Opts::PruneTree {
            model,
            tree,
            max_leaves,
            output,
        } => prune_tree(&model, &tree, max_leaves, &output),
    }
}
