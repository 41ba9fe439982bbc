use std::collections::VecDeque;
use std::error::Error;
use std::path::Path;

use log::info;
use rten_edit::{EditOptions, FrontendRegistry, InputModel, PlaceId, PlaceholderNaming};

mod place_spec;

use place_spec::{PlaceSpec, ShapeSpec};

struct Args {
    /// Model description to load.
    model: String,

    /// Places which become the inputs of the edited model.
    inputs: Vec<PlaceSpec>,

    /// Places which become the outputs of the edited model.
    outputs: Vec<PlaceSpec>,

    /// Shapes to set before editing.
    shapes: Vec<ShapeSpec>,

    placeholder_naming: Option<PlaceholderNaming>,

    /// Print the converted model.
    convert: bool,

    /// Enable verbose logging.
    verbose: bool,
}

fn parse_args() -> Result<Args, lexopt::Error> {
    use lexopt::prelude::*;

    let mut values = VecDeque::new();
    let mut inputs = Vec::new();
    let mut outputs = Vec::new();
    let mut shapes = Vec::new();
    let mut placeholder_naming = None;
    let mut convert = false;
    let mut verbose = false;

    let mut parser = lexopt::Parser::from_env();
    while let Some(arg) = parser.next()? {
        match arg {
            Value(val) => values.push_back(val.string()?),
            Short('i') | Long("input") => {
                let spec = parser.value()?.string()?;
                inputs.push(PlaceSpec::parse(&spec).map_err(|err| err.to_string())?);
            }
            Short('o') | Long("output") => {
                let spec = parser.value()?.string()?;
                outputs.push(PlaceSpec::parse(&spec).map_err(|err| err.to_string())?);
            }
            Short('s') | Long("shape") => {
                let spec = parser.value()?.string()?;
                shapes.push(ShapeSpec::parse(&spec).map_err(|err| err.to_string())?);
            }
            Long("placeholder-naming") => {
                let naming = parser.value()?.string()?;
                placeholder_naming = Some(naming.parse::<PlaceholderNaming>()?);
            }
            Short('c') | Long("convert") => convert = true,
            Short('v') | Long("verbose") => verbose = true,
            Short('h') | Long("help") => {
                println!(
                    "Cut subgraphs out of models and convert them.

Usage: {bin_name} [OPTIONS] <model>

Options:

  -i, --input <place>

    Make <place> an input of the edited model. Can be repeated.

  -o, --output <place>

    Make <place> an output of the edited model. Can be repeated.

    With both inputs and outputs, the subgraph between them is extracted.
    With only inputs or outputs, they replace all existing inputs or outputs.

  -s, --shape <tensor>=<d0>,<d1>,...

    Set the shape of a tensor before editing. Each dimension is a size,
    `?` for an unknown size or a symbol name. Use `...` for an unknown rank.

  --placeholder-naming tensor|consumer

    How to name inputs created for cut ports.

  -c, --convert      Print the converted model
  -v, --verbose      Enable verbose logging
  -h, --help         Print help

Places are written as `<tensor>`, `<op>.in.<N>`, `<op>.out.<N>` or `<op>.op`.
Names containing dots can be quoted.
",
                    bin_name = parser.bin_name().unwrap_or("rten-edit")
                );
                std::process::exit(0);
            }
            _ => return Err(arg.unexpected()),
        }
    }

    let model = values.pop_front().ok_or("missing `<model>` arg")?;

    Ok(Args {
        model,
        inputs,
        outputs,
        shapes,
        placeholder_naming,
        convert,
        verbose,
    })
}

fn resolve_places(
    model: &InputModel,
    specs: &[PlaceSpec],
) -> Result<Vec<PlaceId>, Box<dyn Error>> {
    let mut ids = Vec::with_capacity(specs.len());
    for spec in specs {
        let id = spec
            .resolve(model)
            .ok_or_else(|| format!("place \"{}\" not found in model", spec))?;
        ids.push(id);
    }
    Ok(ids)
}

/// Tool for editing model graphs.
///
/// ```
/// cargo run -p rten-edit-cli model.json -i add_out -o out4 --convert
/// ```
fn main() -> Result<(), Box<dyn Error>> {
    let args = parse_args()?;

    env_logger::builder()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .parse_default_env()
        .init();

    let mut options = EditOptions::from_env();
    if let Some(naming) = args.placeholder_naming {
        options.placeholder_naming(naming);
    }

    let registry = FrontendRegistry::with_default_frontends();
    let frontend = registry
        .get("json")
        .ok_or("JSON frontend is not available")?;
    let mut model = frontend.load_file(Path::new(&args.model), options)?;
    info!("Loaded {}", model);

    for ShapeSpec { tensor, shape } in args.shapes {
        let place = model
            .place_by_tensor_name(&tensor)
            .ok_or_else(|| format!("tensor \"{}\" not found in model", tensor))?
            .id();
        model.set_partial_shape(place, shape)?;
    }

    let inputs = resolve_places(&model, &args.inputs)?;
    let outputs = resolve_places(&model, &args.outputs)?;
    match (inputs.is_empty(), outputs.is_empty()) {
        (false, false) => model.extract_subgraph(&inputs, &outputs)?,
        (false, true) => model.override_all_inputs(&inputs)?,
        (true, false) => model.override_all_outputs(&outputs)?,
        (true, true) => {}
    }

    println!("{}", model);

    if args.convert {
        let converted = frontend.convert(&model)?;
        print!("{}", converted);
    }

    Ok(())
}
