//! System instruction assembly
//!
//! Licensing turns get the auditor persona, the base checklist, the active
//! technical lens and the report layout. General turns get a plain assistant.

mod modules;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Instruction used outside licensing audits
pub const GENERAL_INSTRUCTION: &str = "Você é um assistente útil. Responda em Português.";

/// Lens text when no specialty is active
pub const DEFAULT_LENS: &str = "Realize uma auditoria geral baseada nas normas urbanísticas vigentes.";

const LOTEAMENTO_TITLE: &str = "QUADRO TÉCNICO (Módulo B - Loteamento/Condomínio - Art. 87 Plano Diretor)

    4.1. FASE 1: PRÉ-APROVAÇÃO (Projeto Urbanístico)
    (Analise: ART, Dimensões, Raios, Cordas, Tangências, Numeração de Ruas)

    4.2. FASE 2: ATO DE APROVAÇÃO (Infraestrutura)
    (Analise: Drenagem [Estudo Capacidade, Memorial, ART], Cronograma, Anuências, Perfis de Vias, Marcos)

    4.3. FASE 3: LICENÇA DE IMPLANTAÇÃO
    (Analise: Projetos Complementares, ART Execução)";

const GENERIC_TITLE: &str = "QUADRO TÉCNICO (Módulo Específico)";

/// Conversation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentMode {
    /// Plain assistant, no retrieval, no tools
    General,
    /// Licensing auditor with retrieval and the audit tool
    #[default]
    Licensing,
}

impl FromStr for AgentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GENERAL" | "GERAL" => Ok(Self::General),
            "LICENSING" | "LICENCIAMENTO" => Ok(Self::Licensing),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

/// Technical specialty focusing the audit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Lens {
    /// Subdivisions and condominiums
    Loteamento,
    /// Renovation and extension
    Reforma,
    /// Multi-storey buildings
    Edificacoes,
    /// Commercial and industrial
    Comercial,
}

impl Lens {
    /// All lenses
    pub const ALL: [Self; 4] = [Self::Loteamento, Self::Reforma, Self::Edificacoes, Self::Comercial];

    /// Rule fragment inserted into the instruction
    #[must_use]
    pub fn fragment(self) -> &'static str {
        match self {
            Self::Loteamento => modules::LOTEAMENTO,
            Self::Reforma => modules::REFORMA,
            Self::Edificacoes => modules::EDIFICACOES,
            Self::Comercial => modules::COMERCIAL,
        }
    }

    /// Heading of report item 4
    #[must_use]
    pub fn technical_module_title(self) -> &'static str {
        match self {
            Self::Loteamento => LOTEAMENTO_TITLE,
            Self::Reforma => "QUADRO TÉCNICO (Módulo Reforma e Ampliação)",
            Self::Edificacoes => "QUADRO TÉCNICO (Módulo Edificações)",
            Self::Comercial => "QUADRO TÉCNICO (Módulo Comercial/Industrial)",
        }
    }
}

impl fmt::Display for Lens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Loteamento => "LOTEAMENTO",
            Self::Reforma => "REFORMA",
            Self::Edificacoes => "EDIFICACOES",
            Self::Comercial => "COMERCIAL",
        };
        f.write_str(label)
    }
}

impl FromStr for Lens {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|lens| lens.to_string() == wanted)
            .ok_or_else(|| format!("unknown lens: {s}"))
    }
}

/// Build the system instruction for a turn
#[must_use]
pub fn system_instruction(mode: AgentMode, lens: Option<Lens>) -> String {
    if mode == AgentMode::General {
        return GENERAL_INSTRUCTION.to_string();
    }

    let lens_content = lens.map_or(DEFAULT_LENS, Lens::fragment);
    let module_title = lens.map_or(GENERIC_TITLE, Lens::technical_module_title);

    format!(
        r#"
# {role}

## 1. DIRETRIZES GERAIS
Analise os documentos anexados. Foco em detalhes técnicos e prova real.

## 2. REGRAS BASE
{checklist}

## 3. LENTE TÉCNICA ATIVA (ESPECIALIDADE)
{lens_content}

## 4. CONTEXTO DE LEIS (RAG - BUSCA SOB DEMANDA)
As leis específicas relevantes para a pergunta do usuário serão fornecidas contextualmente na mensagem abaixo.
Use APENAS as leis fornecidas. Se a lei não for citada, NÃO INVENTE.

## 5. INSTRUÇÃO DE SAÍDA (ESTRUTURA DO RELATÓRIO)

Analise os dados extraídos e gere um **LAUDO TÉCNICO** seguindo esta ordem lógica:

**1. IDENTIFICAÇÃO DO PROCESSO**
(Liste Protocolo, Interessado e Assunto)

**2. CHECKLIST DE EXISTÊNCIA DOCUMENTAL (Módulo A)**
(Liste verticalmente cada documento obrigatório e seu status: ✅ Apresentado ou ⚠️ Pendente. Cite o nome do arquivo onde encontrou).

**3. ANÁLISE DE CONFRONTO (PROVA REAL)**
(Cruze os dados. Exemplo:)
*   **Titularidade:** Escritura diz [X] vs Projeto diz [Y]. (Parecer: OK/Erro)
*   **Áreas:** Escritura [X]m² vs Projeto [Y]m² vs BCI [Z]m². (Parecer: OK/Erro)
*   **Endereço:** Confere em todos os docs?

**4. {module_title}**
(Analise conforme as regras do módulo técnico ativo acima. Se for Loteamento, siga o Artigo 87 do Plano Diretor).

**5. RELAÇÃO DE PENDÊNCIAS (COMUNIQUE-SE)**
(Liste de forma clara e direta o que o requerente deve corrigir ou apresentar. Ex: "1. Apresentar CND.").

**6. CONCLUSÃO**
(Deferido ou Indeferido).
"#,
        role = modules::ROLE,
        checklist = modules::BASE_CHECKLIST,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn general_mode_is_plain_assistant() {
        assert_eq!(
            system_instruction(AgentMode::General, Some(Lens::Comercial)),
            GENERAL_INSTRUCTION
        );
    }

    #[test]
    fn licensing_sections_appear_in_order() {
        let text = system_instruction(AgentMode::Licensing, None);
        let headings = [
            "# Você é um AUDITOR",
            "## 1. DIRETRIZES GERAIS",
            "## 2. REGRAS BASE",
            "MÓDULO A: CHECKLIST",
            "## 3. LENTE TÉCNICA ATIVA",
            DEFAULT_LENS,
            "## 4. CONTEXTO DE LEIS",
            "## 5. INSTRUÇÃO DE SAÍDA",
            "**4. QUADRO TÉCNICO (Módulo Específico)**",
            "**6. CONCLUSÃO**",
        ];
        let mut from = 0;
        for heading in headings {
            let at = text[from..]
                .find(heading)
                .unwrap_or_else(|| panic!("{heading} missing or out of order"));
            from += at + heading.len();
        }
    }

    #[test]
    fn loteamento_lists_its_three_phases() {
        let text = system_instruction(AgentMode::Licensing, Some(Lens::Loteamento));
        assert!(text.contains("MÓDULO B: REGRAS PARA LOTEAMENTO"));
        assert!(text.contains("MÓDULO C: LÓGICA DE MOVIMENTAÇÃO DE TERRA"));
        for phase in ["4.1. FASE 1", "4.2. FASE 2", "4.3. FASE 3"] {
            assert!(text.contains(phase), "missing {phase}");
        }
        assert!(!text.contains(DEFAULT_LENS));
    }

    #[test]
    fn each_lens_brings_its_own_title() {
        for lens in Lens::ALL {
            let text = system_instruction(AgentMode::Licensing, Some(lens));
            assert!(text.contains(lens.fragment()));
            assert!(text.contains(&format!("**4. {}**", lens.technical_module_title())));
        }
    }

    #[test]
    fn lens_parses_case_insensitively() {
        assert_eq!("comercial".parse::<Lens>().unwrap(), Lens::Comercial);
        assert_eq!(" EDIFICACOES ".parse::<Lens>().unwrap(), Lens::Edificacoes);
        assert!("industrial".parse::<Lens>().is_err());
        assert_eq!("general".parse::<AgentMode>().unwrap(), AgentMode::General);
    }
}
