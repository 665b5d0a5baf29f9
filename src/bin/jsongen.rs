//! Terminal front end: describe the data, get JSON back

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use log::{debug, error};

use jsongen::artifact::{DirectoryTarget, SystemClipboard};
use jsongen::client::ProxyClient;
use jsongen::config::ClientConfig;
use jsongen::{ClientController, GenerationResult};

const USAGE: &str = "\
usage: jsongen [--copy] [--save DIR] [PROMPT...]

Describe the JSON you want. Without PROMPT the description is read from stdin.

  --copy       copy the generated JSON to the clipboard
  --save DIR   save the generated JSON as DIR/generated.json";

#[derive(Debug, Default, PartialEq)]
struct CliArgs
{   prompt: Option<String>
  , copy: bool
  , save_dir: Option<PathBuf>
}

fn parse_args<I>(args: I) -> Result<CliArgs, String>
where
  I: IntoIterator<Item = String>
{   let mut parsed = CliArgs::default();
    let mut words = Vec::new();
    let mut args = args.into_iter();
    while let Some(arg) = args.next()
    {   match arg.as_str()
        {   "--copy" => parsed.copy = true
          , "--save" => {
              let dir = args.next()
                .ok_or_else(|| "--save needs a directory".to_string())?;
              parsed.save_dir = Some(PathBuf::from(dir));
            }
          , "-h" | "--help" => return Err(String::new())
          , flag if flag.starts_with("--") => {
              return Err(format!("unknown option: {}", flag));
            }
          , _ => words.push(arg)
        }
    }
    if !words.is_empty()
    {   parsed.prompt = Some(words.join(" "));
    }
    Ok(parsed)
}

fn read_stdin() -> Result<String, jsongen::error::Error>
{   let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    Ok(input)
}

async fn run(args: CliArgs) -> Result<i32, jsongen::error::Error>
{   let config = ClientConfig::from_env()?;
    let transport = Arc::new(ProxyClient::from_config(&config)?);
    let controller = ClientController::new(
      &config
    , transport
    , Box::new(SystemClipboard)
    );

    let input = match args.prompt
    {   Some(p) => p
      , None => read_stdin()?
    };

    let code = match controller.generate(input).await
    {   Ok(GenerationResult::Success(_)) => {
          if let Some(text) = controller.snapshot().display_text()
          {   println!("{}", text);
          }
          if args.copy && controller.copy_to_clipboard().await?
          {   eprintln!("Copied!");
          }
          if let Some(dir) = args.save_dir
          {   if let Some(path) = controller
                .download_as_file(Box::new(DirectoryTarget::new(dir)))
                .await?
              {   eprintln!("Saved to {}", path.display());
              }
          }
          0
        }
      , Ok(GenerationResult::Failure(message)) => {
          eprintln!("{}", message);
          1
        }
      , Err(jsongen::error::Error::Validation(message)) => {
          eprintln!("{}", message);
          2
        }
      , Err(e) => return Err(e)
    };

    controller.shutdown().await?;
    Ok(code)
}

#[tokio::main]
async fn main()
{   dotenv::dotenv().ok();
    env_logger::init();

    let args = match parse_args(std::env::args().skip(1))
    {   Ok(a) => a
      , Err(msg) => {
          if !msg.is_empty()
          {   eprintln!("{}", msg);
          }
          eprintln!("{}", USAGE);
          std::process::exit(2);
        }
    };
    debug!("Parsed arguments: {:?}", args);

    match run(args).await
    {   Ok(code) => std::process::exit(code)
      , Err(e) => {
          error!("jsongen failed: {}", e);
          eprintln!("{}", e);
          std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests
{   use super::*;

    fn args(list: &[&str]) -> Vec<String>
    {   list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn joins_prompt_words_and_reads_flags()
    {   let parsed = parse_args(args(&[
          "--copy", "list", "3", "planets", "--save", "/tmp/out"
        ])).unwrap();
        assert_eq!(parsed.prompt.as_deref(), Some("list 3 planets"));
        assert!(parsed.copy);
        assert_eq!(parsed.save_dir, Some(PathBuf::from("/tmp/out")));
    }

    #[test]
    fn no_words_means_stdin()
    {   let parsed = parse_args(args(&[])).unwrap();
        assert_eq!(parsed, CliArgs::default());
    }

    #[test]
    fn save_without_directory_is_an_error()
    {   assert!(parse_args(args(&["--save"])).is_err());
        assert!(parse_args(args(&["--bogus"])).is_err());
    }
}
