use dynslice::dependences::{DependencesExtractor, DependencesPrinter};
use dynslice::slicer::{DynamicSlicer, SlicingCriterion};
use dynslice::trace::TraceFile;
use dynslice::*;

use clap::{crate_version, Arg, ArgAction, Command};

fn main() -> Result<(), slicer::Error> {
    env_logger::init();

    let matches = Command::new("Dynamic slicer")
        .version(crate_version!())
        .about("Compute dynamic slices of recorded bytecode traces")
        .arg(
            Arg::new("TRACE_FILE")
                .help("Trace file to slice")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("criterion")
                .long("criterion")
                .short('c')
                .value_name("CRITERION")
                .required(true)
                .help("Slicing criteria (eg. `Simple1.main:8:{b}`), separated by commas"),
        )
        .arg(
            Arg::new("thread")
                .long("thread")
                .value_name("ID|NAME")
                .help("Thread to slice (defaults to the main thread)"),
        )
        .arg(
            Arg::new("parallel")
                .long("parallel")
                .action(ArgAction::SetTrue)
                .help("Fan events out to the visitors on a worker pool"),
        )
        .arg(
            Arg::new("pipelined")
                .long("pipelined")
                .action(ArgAction::SetTrue)
                .help("Read the trace on a background thread"),
        )
        .arg(
            Arg::new("print-dependences")
                .long("print-dependences")
                .action(ArgAction::SetTrue)
                .help("Log every dependence (at `info` level)"),
        )
        .arg(
            Arg::new("show-distances")
                .long("show-distances")
                .action(ArgAction::SetTrue)
                .help("Show the distance of every instruction to the criterion"),
        )
        .get_matches();

    let mut settings = Settings::new();
    settings.parallel = matches.get_flag("parallel");
    settings.pipelined = matches.get_flag("pipelined");

    let criteria = match matches.get_one::<String>("criterion") {
        Some(criteria) => SlicingCriterion::parse_list(criteria)?,
        None => vec![],
    };

    let trace_file = matches
        .get_one::<String>("TRACE_FILE")
        .map(String::as_str)
        .unwrap_or_default();
    log::info!("Reading '{}'", trace_file);
    let trace = TraceFile::load(trace_file)?;
    let thread = match matches.get_one::<String>("thread") {
        Some(selector) => trace.thread(selector)?,
        None => trace.main_thread()?,
    };
    log::info!(
        "Slicing thread {} ({}) for {}",
        thread.id,
        thread.name,
        criteria
            .iter()
            .map(|criterion| criterion.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let program = &trace.program;
    let criteria = criteria
        .iter()
        .map(|criterion| criterion.instantiate(program))
        .collect::<Result<Vec<_>, _>>()?;
    let mut slicer = DynamicSlicer::new(program, criteria);
    let mut printer = DependencesPrinter::new(program);
    {
        let mut extractor = DependencesExtractor::new(program);
        extractor.register(&mut slicer, DynamicSlicer::CAPABILITIES);
        if matches.get_flag("print-dependences") {
            extractor.register(&mut printer, DependencesPrinter::CAPABILITIES);
        }
        extractor.process(thread.backward_iterator(program), &settings)?;
    }

    let slice = slicer.finish();
    log::info!("The slice contains {} instructions", slice.len());
    print!(
        "{}",
        slice.display(program, matches.get_flag("show-distances"))
    );

    Ok(())
}
