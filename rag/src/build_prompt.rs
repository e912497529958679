use std::fmt;
use std::str::FromStr;

use minijinja::{context, Environment};
use serde::Serialize;

use crate::error::{RagError, Result};

const TEMPLATE_NAME: &str = "prompt";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => f.write_str("system"),
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Built-in prompt wording.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptPreset {
    General,
    /// Answers in the layout of the library's indexing manual.
    Indexing,
}

impl PromptPreset {
    pub fn system_prompt(self) -> &'static str {
        match self {
            PromptPreset::General => GENERAL_SYSTEM,
            PromptPreset::Indexing => INDEXING_SYSTEM,
        }
    }

    pub fn template(self) -> &'static str {
        match self {
            PromptPreset::General => GENERAL_TEMPLATE,
            PromptPreset::Indexing => INDEXING_TEMPLATE,
        }
    }
}

impl FromStr for PromptPreset {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "general" | "default" => Ok(PromptPreset::General),
            "indexing" | "indexacao" => Ok(PromptPreset::Indexing),
            other => Err(RagError::Config(format!(
                "unknown prompt preset '{other}' (expected general or indexing)"
            ))),
        }
    }
}

const GENERAL_SYSTEM: &str = "You are an assistant for librarians. Answer only from the provided document. \
If the document does not contain the answer, say so plainly instead of guessing.";

const GENERAL_TEMPLATE: &str = "\
Document: {{ document }}

Context:
{{ context }}
{% if history %}
Conversation so far:
{% for turn in history %}{{ turn.role }}: {{ turn.content }}
{% endfor %}{% endif %}
Question: {{ question }}";

const INDEXING_SYSTEM: &str = "Você é um assistente de bibliotecários que consulta o Manual de Indexação. \
Responda apenas com base no documento fornecido.";

const INDEXING_TEMPLATE: &str = "\
Contexto do documento {{ document }}:
{{ context }}
{% if history %}
Histórico da conversa:
{% for turn in history %}{{ turn.role }}: {{ turn.content }}
{% endfor %}{% endif %}
Pergunta: {{ question }}

---
**REGRA OBRIGATÓRIA E EXEMPLO DE FORMATO DE RESPOSTA:**

Sua resposta deve seguir o formato exato deste exemplo.

**Exemplo de Formato da Resposta:**
Termos de Indexação:
[Termo 1]
[Termo 2]

É necessário resumo.
Exemplo de resumo: [Conteúdo do Exemplo]

Você pode verificar a informação na página [cite a página] do Manual de Indexação.

---

**Instruções para a sua resposta:**

- Liste cada termo de indexação em uma nova linha, após o cabeçalho \"Termos de Indexação:\".
- Verifique a tabela no documento para a regra do resumo.
- Se a coluna de resumo tiver um exemplo, use o formato \"É necessário resumo.\" seguido, na linha de baixo, por \"Exemplo de resumo: [Conteúdo do Exemplo]\".
- Se a coluna de resumo tiver um '#', use o formato \"Não é necessário resumo para este tipo de documento.\"

---";

/// A compiled prompt template.
///
/// Variables: `document`, `context`, `question` and `history` (a list of
/// `{role, content}` turns). `question` is mandatory.
pub struct PromptTemplate {
    env: Environment<'static>,
    uses_history: bool,
}

impl fmt::Debug for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptTemplate")
            .field("uses_history", &self.uses_history)
            .finish_non_exhaustive()
    }
}

impl PromptTemplate {
    pub fn new(source: &str) -> Result<Self> {
        let mut env = Environment::new();
        env.add_template_owned(TEMPLATE_NAME, source.to_string())?;
        let vars = env.get_template(TEMPLATE_NAME)?.undeclared_variables(false);
        if !vars.contains("question") {
            return Err(RagError::Config(
                "prompt template must reference {{ question }}".to_string(),
            ));
        }
        Ok(Self {
            uses_history: vars.contains("history"),
            env,
        })
    }

    pub fn uses_history(&self) -> bool {
        self.uses_history
    }

    pub fn render(
        &self,
        document: &str,
        context: &str,
        history: &[Message],
        question: &str,
    ) -> Result<String> {
        let tmpl = self.env.get_template(TEMPLATE_NAME)?;
        let rendered = tmpl.render(context! {
            document => document,
            context => context,
            history => history,
            question => question,
        })?;
        Ok(rendered)
    }
}

/// Assembles the chat messages for one question.
///
/// History is rendered into the template when the template asks for it and
/// is otherwise sent as separate turns between the system and user messages.
pub fn build_prompt(
    system_prompt: &str,
    template: &PromptTemplate,
    document: &str,
    context: &str,
    history: &[Message],
    question: &str,
) -> Result<Vec<Message>> {
    let mut messages = vec![Message::system(system_prompt)];
    if template.uses_history() {
        messages.push(Message::user(template.render(document, context, history, question)?));
    } else {
        messages.extend(history.iter().cloned());
        messages.push(Message::user(template.render(document, context, &[], question)?));
    }
    Ok(messages)
}

/// The last `turns` question/answer pairs of `history`.
pub fn recent_history(history: &[Message], turns: usize) -> &[Message] {
    let keep = turns.saturating_mul(2).min(history.len());
    &history[history.len() - keep..]
}

/// Cuts `text` to `max_chars` chars, reporting whether anything was dropped.
pub fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (&text[..byte_idx], true),
        None => (text, false),
    }
}
