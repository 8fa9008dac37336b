//! Homework module: the quadratic solver, Wolfram|Alpha, and filing
//! downloaded homework.

use std::path::{Path, PathBuf};

use anyhow::Context as _;

use super::{CommandError, Context, number, required};
use crate::plot;
use crate::quadratic::Equation;

/// Upper bound on the points drawn for one plot.
pub const MAX_PLOT_SAMPLES: f64 = 20_000.0;
/// File name of the rendered plot inside the images directory.
pub const PLOT_FILE: &str = "quadratics.png";

pub async fn quadratics(ctx: &Context<'_>, args: &str) -> Result<(), CommandError> {
    let mut args = args.split_whitespace();
    let a = number(required(&mut args, "a")?, "a")?;
    let b = number(required(&mut args, "b")?, "b")?;
    let c = number(required(&mut args, "c")?, "c")?;

    ctx.handle.typing_start(ctx.reply_target()).await?;
    let result = solve_and_plot(ctx, Equation::new(a, b, c)).await;
    ctx.handle.typing_stop(ctx.reply_target()).await?;
    result
}

/// Send the worked answer, then render and link the plot.
async fn solve_and_plot(ctx: &Context<'_>, equation: Equation) -> Result<(), CommandError> {
    let (x1, x2) = equation.roots()?;
    let (h, k) = equation.vertex()?;
    let answer = format!(
        "[+] Standard Form = {}\n\
         [+] Vertex Form = {}\n\
         [+] 1st zero/root = {x1}\n\
         [+] 2nd zero/root = {x2}\n\
         [+] Vertex = ({h}, {k})\n\
         [+] AOS: x = {h}",
        equation.standard_form(),
        equation.vertex_form()?,
    );
    ctx.say(&answer).await?;

    let points = plot_points(&equation, ctx.state.config.plot_step)?;
    let path = ctx.state.config.images_dir.join(PLOT_FILE);
    let target = path.clone();
    tokio::task::spawn_blocking(move || plot::render_png(&points, &target))
        .await
        .context("Plot task failed")??;

    ctx.say(&plot_location(ctx.state.config.media_url.as_deref(), &path))
        .await?;
    Ok(())
}

/// Points to draw: between the roots, or a unit window either side of the
/// vertex for a double root. The step is widened so at most
/// [`MAX_PLOT_SAMPLES`] points are produced.
pub fn plot_points(equation: &Equation, step: f64) -> Result<Vec<(f64, f64)>, CommandError> {
    let (x1, x2) = equation.roots()?;
    let (low, high) = if x1 == x2 {
        let (h, _) = equation.vertex()?;
        (h - 1.0, h + 1.0)
    } else {
        (x1.min(x2), x1.max(x2))
    };
    if !(low.is_finite() && high.is_finite()) {
        return Err(CommandError::BadArgument(
            "The roots are too large to plot.".to_string(),
        ));
    }
    let step = step.max((high - low) / MAX_PLOT_SAMPLES);
    Ok(equation.sample_range(low, high, step)?.collect())
}

/// Where the rendered plot can be seen.
fn plot_location(media_url: Option<&str>, path: &Path) -> String {
    match media_url {
        Some(base) => format!("{}/{PLOT_FILE}", base.trim_end_matches('/')),
        None => format!("Plot saved to {}", path.display()),
    }
}

pub async fn wolfram(ctx: &Context<'_>, args: &str) -> Result<(), CommandError> {
    if args.is_empty() {
        return Err(CommandError::MissingArgument("question"));
    }
    let client = ctx
        .state
        .wolfram
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("No Wolfram|Alpha app id is configured"))?;

    ctx.handle.typing_start(ctx.reply_target()).await?;
    let answer = client.query(args).await;
    ctx.handle.typing_stop(ctx.reply_target()).await?;
    ctx.say(&answer?).await?;
    Ok(())
}

pub async fn config_homework(ctx: &Context<'_>, args: &str) -> Result<(), CommandError> {
    let (topic, name) = match args.split_once(char::is_whitespace) {
        Some((topic, name)) if !name.trim().is_empty() => (topic, name.trim()),
        _ if args.is_empty() => return Err(CommandError::MissingArgument("new_topic")),
        _ => return Err(CommandError::MissingArgument("new_name")),
    };

    ctx.state.db.set_homework(ctx.author, name, topic)?;
    tracing::info!(user = ctx.author, name, topic, "Homework profile updated");
    ctx.say(&format!("`New name: {name}`\n`New topic: {topic}`"))
        .await?;
    Ok(())
}

pub async fn download(ctx: &Context<'_>, args: &str) -> Result<(), CommandError> {
    let mut args = args.split_whitespace().peekable();
    let day = args.next().ok_or(CommandError::MissingArgument("day"))?;
    let page = match args.peek().and_then(|p| p.parse::<u32>().ok()) {
        Some(page) => {
            args.next();
            page
        }
        None => 1,
    };
    let urls: Vec<&str> = args.collect();
    if urls.is_empty() {
        return Err(CommandError::MissingArgument("urls"));
    }

    let profile = ctx.state.db.homework(ctx.author)?.ok_or_else(|| {
        CommandError::BadArgument(format!(
            "No homework profile yet. Run `{}conf-hw <topic> <name>` first.",
            ctx.prefix
        ))
    })?;

    let dir = &ctx.state.config.homework_dir;
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    for url in urls {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| CommandError::BadArgument(format!("Invalid URL {url}: {e}")))?;
        let file_name = homework_file_name(
            &profile.fullname,
            day,
            &profile.topic,
            page,
            &extension_of(&parsed),
        );
        let path: PathBuf = dir.join(&file_name);

        let bytes = ctx
            .state
            .http
            .get(parsed)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("Failed to download {url}"))?
            .bytes()
            .await
            .with_context(|| format!("Failed to read {url}"))?;
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        tracing::info!(path = %path.display(), bytes = bytes.len(), "Homework saved");
        ctx.say(&format!("Saved `{file_name}`")).await?;
    }
    Ok(())
}

/// `<name> - Day <day> <topic> Page #<page><ext>`.
pub fn homework_file_name(name: &str, day: &str, topic: &str, page: u32, ext: &str) -> String {
    format!("{name} - Day {day} {topic} Page #{page}{ext}")
}

/// Last four characters of the URL's file name, e.g. `.pdf`.
fn extension_of(url: &reqwest::Url) -> String {
    let file = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");
    let chars: Vec<char> = file.chars().collect();
    chars[chars.len().saturating_sub(4)..].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plot_covers_the_roots() {
        let points = plot_points(&Equation::new(1.0, -3.0, 2.0), 0.0001).unwrap();
        assert_eq!(points.first().map(|p| p.0), Some(1.0));
        assert!(points.last().unwrap().0 < 2.0);
        assert!(points.len() as f64 <= MAX_PLOT_SAMPLES + 1.0);
    }

    #[test]
    fn wide_intervals_are_thinned() {
        let points = plot_points(&Equation::new(1.0, 0.0, -1_000_000.0), 0.0001).unwrap();
        assert!(points.len() as f64 <= MAX_PLOT_SAMPLES + 1.0);
        assert!(points.len() > 1000);
    }

    #[test]
    fn double_root_plots_around_the_vertex() {
        let points = plot_points(&Equation::new(1.0, -4.0, 4.0), 0.01).unwrap();
        assert_eq!(points.first().map(|p| p.0), Some(1.0));
        assert!(points.last().unwrap().0 < 3.0);
        assert!(points.iter().all(|(_, y)| *y > -1e-9));
    }

    #[test]
    fn complex_roots_cannot_be_plotted() {
        assert!(matches!(
            plot_points(&Equation::new(1.0, 0.0, 1.0), 0.01),
            Err(CommandError::Domain(_))
        ));
    }

    #[test]
    fn overflowing_roots_are_not_plotted() {
        let err = plot_points(&Equation::new(1e200, 1e200, 1.0), 0.0001).unwrap_err();
        assert_eq!(err.to_string(), "The roots are too large to plot.");
    }

    #[test]
    fn file_names() {
        assert_eq!(
            homework_file_name("Ada Lovelace", "3", "Algebra", 2, ".pdf"),
            "Ada Lovelace - Day 3 Algebra Page #2.pdf"
        );
        let url = reqwest::Url::parse("https://example.com/files/scan.jpeg?dl=1").unwrap();
        assert_eq!(extension_of(&url), "jpeg");
        let url = reqwest::Url::parse("https://example.com/a.png").unwrap();
        assert_eq!(extension_of(&url), ".png");
    }

    #[test]
    fn plot_location_prefers_media_url() {
        let path = Path::new("data/images/quadratics.png");
        assert_eq!(
            plot_location(Some("https://media.example/harper/"), path),
            "https://media.example/harper/quadratics.png"
        );
        assert_eq!(
            plot_location(None, path),
            "Plot saved to data/images/quadratics.png"
        );
    }
}
