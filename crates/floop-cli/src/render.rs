//! Terminal rendering helpers. Pure presentation — no engine logic lives
//! here.

use colored::Colorize;

use floop_core::engine::ActivationExplanation;
use floop_core::learning::{LearningResult, Placement};
use floop_core::model::Behavior;

pub fn learning_result(result: &LearningResult) {
    match &result.placement {
        Placement::Create => {
            println!(
                "{} {} ({})",
                "created".green().bold(),
                result.behavior.name,
                result.behavior.id
            );
        }
        Placement::Merge { target } => {
            println!(
                "{} into {} (similarity {:.2})",
                "merged".yellow().bold(),
                target,
                result.similarity
            );
        }
        Placement::Specialize { target } => {
            println!(
                "{} of {} (similarity {:.2})",
                "specialized".blue().bold(),
                target,
                result.similarity
            );
        }
    }
    println!("  {}", result.behavior.content.canonical);
    if result.requires_review {
        println!("  {} ({})", "pending review".red().bold(), result.review_reasons.join("; "));
    } else {
        println!("  {}", "auto-accepted".green());
    }
}

pub fn behavior_list(behaviors: &[Behavior]) {
    if behaviors.is_empty() {
        println!("{}", "no behaviors in scope".dimmed());
        return;
    }
    for behavior in behaviors {
        let kind = format!("{:<11}", behavior.kind.as_str());
        println!(
            "{} {} {} (priority {}, confidence {:.2})",
            kind.cyan(),
            behavior.id,
            behavior.name.bold(),
            behavior.priority,
            behavior.confidence
        );
    }
}

pub fn explanation(explanation: &ActivationExplanation) {
    let score = &explanation.score;
    println!("{}: {}", explanation.behavior.name.bold(), explanation.behavior.content.canonical);
    println!(
        "  matched context: {}",
        if explanation.matched_context { "yes".green() } else { "no".red() }
    );
    println!(
        "  score: total {:.3} (context {:.3}, base-level {:.3}, feedback {:.3}, priority {:.3})",
        score.total, score.context_score, score.base_level_score, score.feedback_score, score.priority_score
    );
}
